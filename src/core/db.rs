use crate::core::error::CacheError;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &Path) -> Result<Connection, CacheError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    Ok(conn)
}

pub fn cache_db_path(root: &Path) -> PathBuf {
    root.join(schemas::CACHE_DB_NAME)
}

pub fn initialize_cache_db(root: &Path) -> Result<PathBuf, CacheError> {
    fs::create_dir_all(root)?;
    let db_path = cache_db_path(root);
    let conn = db_connect(&db_path)?;
    conn.execute(schemas::CACHE_DB_SCHEMA_ENTRIES, [])?;
    conn.execute(schemas::CACHE_DB_INDEX_VERSION, [])?;
    log::debug!("cache database initialized at {}", db_path.display());
    Ok(db_path)
}
