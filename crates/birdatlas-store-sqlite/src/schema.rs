//! SQL schema for the birdatlas SQLite store.
//!
//! Only the two tables that outlive a pipeline run are created at
//! connection startup. The four structured tables are dropped and
//! recreated wholesale by the operations that own them, so their DDL lives
//! in separate constants.

/// Persistent schema; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Latest raw content per source, with provenance. One row per source;
-- a new fetch replaces the old row. No history is kept.
CREATE TABLE IF NOT EXISTS source_snapshots (
    source        TEXT PRIMARY KEY,  -- SourceKey string form
    raw_content   TEXT NOT NULL,
    fetched_at    TEXT NOT NULL,     -- RFC 3339 UTC
    version_token TEXT,              -- commit sha; NULL for query sources
    version_date  TEXT               -- RFC 3339 UTC; NULL for query sources
);

-- Enrichment cache. A NULL result is a cached 'no data upstream' outcome.
CREATE TABLE IF NOT EXISTS enrichment_cache (
    birdnet_id INTEGER PRIMARY KEY,
    result     TEXT,                 -- JSON EnrichmentRecord or NULL
    expires_at TEXT NOT NULL         -- RFC 3339 UTC, jittered
);

PRAGMA user_version = 1;
";

/// Rebuilt from the `taxo_code` snapshot; line number = birdnet_id.
pub const TAXO_CODES_DDL: &str = "
DROP TABLE IF EXISTS taxo_codes;
CREATE TABLE taxo_codes (
    birdnet_id INTEGER PRIMARY KEY,
    ebird_id   TEXT NOT NULL
);
";

/// Rebuilt from the `birdnet_species` snapshot; line number = birdnet_id.
pub const BIRDNET_SPECIES_DDL: &str = "
DROP TABLE IF EXISTS birdnet_species;
CREATE TABLE birdnet_species (
    birdnet_id      INTEGER PRIMARY KEY,
    scientific_name TEXT NOT NULL,
    common_name     TEXT NOT NULL
);
";

/// Rebuilt from the `wikidata_species` snapshot. No primary key — the
/// upstream export can legitimately repeat a Q-id.
pub const WIKIDATA_SPECIES_DDL: &str = "
DROP TABLE IF EXISTS wikidata_species;
CREATE TABLE wikidata_species (
    wikidata_qid    TEXT NOT NULL,
    item_label      TEXT,
    scientific_name TEXT,
    taxon_rank      TEXT,
    ebird_id        TEXT
);
";

pub const DROP_MAPPING_DDL: &str = "DROP TABLE IF EXISTS bird_mapping";

/// The consolidated mapping table. `IF NOT EXISTS` keeps the create step
/// safe to re-run without a preceding drop.
pub const CREATE_MAPPING_DDL: &str = "
CREATE TABLE IF NOT EXISTS bird_mapping (
    birdnet_id      INTEGER PRIMARY KEY,
    scientific_name TEXT,
    wikidata_qid    TEXT
);
";
