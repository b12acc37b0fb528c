//! Storage backends for the recommendation cache.
//!
//! A backend only moves whole `CacheEntry` values keyed by fingerprint.
//! Version checks and error recovery live in `RecommendationCache`.

use crate::core::db;
use crate::core::error::CacheError;
use crate::core::schemas;
use crate::engine::cache::CacheEntry;
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use ulid::Ulid;

pub trait CacheStore: Send + Sync {
    fn load(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError>;
    /// Replaces any entry stored under `entry.fingerprint`.
    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError>;
    fn remove(&self, fingerprint: &str) -> Result<bool, CacheError>;
    /// Removes every entry and returns how many there were.
    fn clear(&self) -> Result<usize, CacheError>;
    /// Stored fingerprints in ascending order.
    fn fingerprints(&self) -> Result<Vec<String>, CacheError>;
}

/// Fingerprints become file names, so only lowercase hex is accepted.
pub fn validate_fingerprint(fingerprint: &str) -> Result<(), CacheError> {
    if !fingerprint.is_empty()
        && fingerprint
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        Ok(())
    } else {
        Err(CacheError::InvalidFingerprint(fingerprint.to_string()))
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries().get(fingerprint).cloned())
    }

    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries()
            .insert(entry.fingerprint.clone(), entry.clone());
        Ok(())
    }

    fn remove(&self, fingerprint: &str) -> Result<bool, CacheError> {
        Ok(self.entries().remove(fingerprint).is_some())
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    fn fingerprints(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.entries().keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Directory of JSON files
// ---------------------------------------------------------------------------

/// One `<fingerprint>.json` per entry. Writes land in a temporary file that is
/// renamed over the final name, so a reader sees the old entry or the new
/// one, never a partial file.
pub struct FsCacheStore {
    dir: PathBuf,
}

impl FsCacheStore {
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn entry_path(&self, fingerprint: &str) -> Result<PathBuf, CacheError> {
        validate_fingerprint(fingerprint)?;
        Ok(self.dir.join(format!("{fingerprint}.json")))
    }
}

impl CacheStore for FsCacheStore {
    fn load(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(fingerprint)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let entry: CacheEntry = serde_json::from_str(&raw).map_err(|e| CacheError::Corrupt {
            fingerprint: fingerprint.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        if entry.fingerprint != fingerprint {
            return Err(CacheError::Corrupt {
                fingerprint: fingerprint.to_string(),
                reason: format!("file holds entry for '{}'", entry.fingerprint),
            });
        }
        Ok(Some(entry))
    }

    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let final_path = self.entry_path(&entry.fingerprint)?;
        let tmp_path = self
            .dir
            .join(format!(".{}.{}.tmp", entry.fingerprint, Ulid::new()));

        let bytes = serde_json::to_vec_pretty(entry)?;
        if let Err(e) = fs::write(&tmp_path, bytes).and_then(|_| fs::rename(&tmp_path, &final_path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(CacheError::Io(e));
        }
        Ok(())
    }

    fn remove(&self, fingerprint: &str) -> Result<bool, CacheError> {
        let path = self.entry_path(fingerprint)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let fingerprints = self.fingerprints()?;
        for fingerprint in &fingerprints {
            fs::remove_file(self.entry_path(fingerprint)?)?;
        }
        // Temp files left behind by interrupted writes; not counted as entries.
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            let is_tmp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"));
            if is_tmp && path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        Ok(fingerprints.len())
    }

    fn fingerprints(&self) -> Result<Vec<String>, CacheError> {
        let mut out = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_fingerprint(stem).is_ok() {
                out.push(stem.to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Entries in one SQLite table; each write is a single upsert statement.
pub struct SqliteCacheStore {
    db_path: PathBuf,
}

impl SqliteCacheStore {
    pub fn open(root: &Path) -> Result<Self, CacheError> {
        let db_path = db::initialize_cache_db(root)?;
        Ok(Self { db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl CacheStore for SqliteCacheStore {
    fn load(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        let conn = db::db_connect(&self.db_path)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT entry_json FROM cache_entries WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_str(&raw).map_err(|e| CacheError::Corrupt {
            fingerprint: fingerprint.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(entry))
    }

    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let conn = db::db_connect(&self.db_path)?;
        let entry_json = serde_json::to_string(entry)?;
        conn.execute(
            schemas::CACHE_DB_UPSERT,
            params![
                entry.fingerprint,
                entry.recommendation_logic_version,
                entry.advisor_model_identifier,
                entry.created_at,
                entry.recommendations.len() as i64,
                entry_json
            ],
        )?;
        Ok(())
    }

    fn remove(&self, fingerprint: &str) -> Result<bool, CacheError> {
        let conn = db::db_connect(&self.db_path)?;
        let changed = conn.execute(
            "DELETE FROM cache_entries WHERE fingerprint = ?1",
            params![fingerprint],
        )?;
        Ok(changed > 0)
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let conn = db::db_connect(&self.db_path)?;
        Ok(conn.execute("DELETE FROM cache_entries", [])?)
    }

    fn fingerprints(&self) -> Result<Vec<String>, CacheError> {
        let conn = db::db_connect(&self.db_path)?;
        let mut stmt = conn.prepare("SELECT fingerprint FROM cache_entries ORDER BY fingerprint")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
