//! Validated Wikidata entity identifiers.

use std::{fmt, str::FromStr};

use crate::{Error, Result};

/// A Wikidata entity id (`Q` followed by decimal digits, e.g. `Q25334`).
///
/// Construction goes through [`FromStr`], which rejects anything not matching
/// the pattern — ids are interpolated into SPARQL query text, so they are
/// validated once at the boundary and trusted everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId(String);

impl EntityId {
  pub fn as_str(&self) -> &str { &self.0 }

  pub fn into_string(self) -> String { self.0 }
}

impl FromStr for EntityId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let digits = s.strip_prefix('Q').unwrap_or("");
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
      return Err(Error::InvalidEntityId(s.to_owned()));
    }
    Ok(Self(s.to_owned()))
  }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_well_formed_ids() {
    assert_eq!("Q25334".parse::<EntityId>().unwrap().as_str(), "Q25334");
    assert_eq!("Q1".parse::<EntityId>().unwrap().as_str(), "Q1");
  }

  #[test]
  fn rejects_malformed_ids() {
    for bad in ["", "Q", "123", "q123", "Q12a", "Q 12", "P225", "Q-1"] {
      assert!(bad.parse::<EntityId>().is_err(), "accepted {bad:?}");
    }
  }
}
