//! SQLite schema for the persistent recommendation cache.
//!
//! One row per fingerprint. The full `CacheEntry` is stored as JSON so the
//! row can be replaced in a single statement.

pub const CACHE_DB_NAME: &str = "recommendations.db";

pub const CACHE_DB_SCHEMA_ENTRIES: &str = "
    CREATE TABLE IF NOT EXISTS cache_entries (
        fingerprint TEXT PRIMARY KEY,
        logic_version TEXT NOT NULL,
        advisor_model TEXT NOT NULL,
        created_at TEXT NOT NULL,
        num_recommendations INTEGER NOT NULL,
        entry_json TEXT NOT NULL
    )
";
pub const CACHE_DB_INDEX_VERSION: &str =
    "CREATE INDEX IF NOT EXISTS idx_cache_entries_version ON cache_entries(logic_version)";

pub const CACHE_DB_UPSERT: &str = "
    INSERT INTO cache_entries
        (fingerprint, logic_version, advisor_model, created_at, num_recommendations, entry_json)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT(fingerprint) DO UPDATE SET
        logic_version = excluded.logic_version,
        advisor_model = excluded.advisor_model,
        created_at = excluded.created_at,
        num_recommendations = excluded.num_recommendations,
        entry_json = excluded.entry_json
";
