//! `SQLite` schema definitions for the location store.

/// SQL statement to create the locations table.
///
/// `(driver_key, member)` is the primary key, which makes re-inserting an
/// identical record a no-op.
pub const CREATE_LOCATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS locations (
    driver_key TEXT NOT NULL,
    member TEXT NOT NULL,
    score INTEGER NOT NULL,
    PRIMARY KEY (driver_key, member)
)
";

/// SQL statement to create the per-driver score index used by range scans
/// and rank-based eviction.
pub const CREATE_SCORE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_locations_driver_score
ON locations(driver_key, score, member)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_LOCATIONS_TABLE,
    CREATE_SCORE_INDEX,
    CREATE_METADATA_TABLE,
];
