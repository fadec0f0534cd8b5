//! Fetch, import, mapping-build, and enrichment orchestration for
//! birdatlas.
//!
//! Everything here is generic over [`birdatlas_core::store::TaxonomyStore`]
//! and depends on the network only through [`reqwest`]. The mapping builder
//! is a resumable sequence of idempotent steps; the enrichment cache sits
//! behind a cross-process file throttle so every Wikidata call in every
//! process shares one rate limit.

pub mod builder;
pub mod cache;
pub mod error;
pub mod export;
pub mod fetch;
pub mod github;
pub mod image;
pub mod import;
pub mod sparql;
pub mod throttle;

pub use error::{Error, Result};

/// Identifying header sent with every outbound HTTP request.
pub const USER_AGENT: &str =
  "birdatlas/0.1 (+https://github.com/birdatlas/birdatlas)";

#[cfg(test)]
mod tests;
