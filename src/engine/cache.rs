//! Recommendation cache.
//!
//! Entries are keyed by fingerprint and tagged with the recommendation logic
//! version that produced them. A version mismatch reads as a miss, and so
//! does an unreadable entry: the cache is an optimization, never a source of
//! truth. There is no eviction; entries leave only through `invalidate` or
//! `invalidate_all`.

use crate::core::config::CacheConfig;
use crate::core::error::CacheError;
use crate::core::time;
use crate::engine::cache_store::{CacheStore, FsCacheStore, MemoryCacheStore, SqliteCacheStore};
use crate::engine::recommendation::{Recommendation, TargetStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const CONFIDENCE_CHANGE_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub recommendation_logic_version: String,
    /// Empty when the recommendations are rule-based only.
    #[serde(default)]
    pub advisor_model_identifier: String,
    #[serde(default)]
    pub target: TargetStore,
    pub created_at: String,
    pub recommendations: Vec<Recommendation>,
}

impl CacheEntry {
    pub fn new(
        fingerprint: &str,
        logic_version: &str,
        advisor_model_identifier: &str,
        target: TargetStore,
        recommendations: Vec<Recommendation>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            recommendation_logic_version: logic_version.to_string(),
            advisor_model_identifier: advisor_model_identifier.to_string(),
            target,
            created_at: time::now_epoch_z(),
            recommendations,
        }
    }

    pub fn is_advisor_backed(&self) -> bool {
        !self.advisor_model_identifier.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntrySummary {
    pub fingerprint: String,
    pub logic_version: String,
    pub advisor_model: String,
    pub created_at: String,
    pub num_recommendations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecommendationChange {
    DecisionChanged {
        relationship: String,
        from: String,
        to: String,
    },
    ConfidenceChanged {
        relationship: String,
        from: f64,
        to: f64,
    },
    Added {
        relationship: String,
        decision: String,
    },
    Removed {
        relationship: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheComparison {
    pub fingerprint_a: String,
    pub fingerprint_b: String,
    pub total_in_a: usize,
    pub total_in_b: usize,
    pub changes: Vec<RecommendationChange>,
    pub is_identical: bool,
}

pub struct RecommendationCache {
    store: Box<dyn CacheStore>,
}

impl RecommendationCache {
    pub fn new(store: Box<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryCacheStore::new()))
    }

    pub fn on_disk(dir: &Path) -> Result<Self, CacheError> {
        Ok(Self::new(Box::new(FsCacheStore::open(dir)?)))
    }

    pub fn sqlite(root: &Path) -> Result<Self, CacheError> {
        Ok(Self::new(Box::new(SqliteCacheStore::open(root)?)))
    }

    /// JSON directory at `cache.dir` when set, otherwise process memory.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        match &config.dir {
            Some(dir) => Self::on_disk(dir),
            None => Ok(Self::in_memory()),
        }
    }

    /// Entry for `fingerprint` if it was produced by `logic_version`.
    pub fn get(&self, fingerprint: &str, logic_version: &str) -> Option<CacheEntry> {
        let entry = match self.store.load(fingerprint) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                log::debug!("cache miss: {fingerprint}");
                return None;
            }
            Err(e) => {
                log::warn!("cache entry {fingerprint} unreadable, treating as absent: {e}");
                return None;
            }
        };

        if entry.recommendation_logic_version != logic_version {
            log::info!(
                "cache invalidated (version {} != {}): {fingerprint}",
                entry.recommendation_logic_version,
                logic_version
            );
            return None;
        }

        log::info!(
            "cache hit: {fingerprint} ({} recommendations)",
            entry.recommendations.len()
        );
        Some(entry)
    }

    /// Upsert: replaces whatever is stored under `fingerprint`.
    pub fn put(&self, fingerprint: &str, mut entry: CacheEntry) -> Result<(), CacheError> {
        entry.fingerprint = fingerprint.to_string();
        self.store.store(&entry)?;
        log::info!(
            "cached {} recommendations: {fingerprint}",
            entry.recommendations.len()
        );
        Ok(())
    }

    pub fn invalidate(&self, fingerprint: &str) -> Result<bool, CacheError> {
        let removed = self.store.remove(fingerprint)?;
        if removed {
            log::info!("invalidated cache entry: {fingerprint}");
        }
        Ok(removed)
    }

    /// Clears every entry regardless of version.
    pub fn invalidate_all(&self) -> Result<usize, CacheError> {
        let count = self.store.clear()?;
        log::info!("invalidated {count} cache entries");
        Ok(count)
    }

    /// Summaries of all readable entries, sorted by fingerprint.
    pub fn list_entries(&self) -> Result<Vec<CacheEntrySummary>, CacheError> {
        let mut out = Vec::new();
        for fingerprint in self.store.fingerprints()? {
            match self.store.load(&fingerprint) {
                Ok(Some(entry)) => out.push(CacheEntrySummary {
                    fingerprint: entry.fingerprint,
                    logic_version: entry.recommendation_logic_version,
                    advisor_model: entry.advisor_model_identifier,
                    created_at: entry.created_at,
                    num_recommendations: entry.recommendations.len(),
                }),
                Ok(None) => {}
                Err(e) => log::warn!("skipping unreadable cache entry {fingerprint}: {e}"),
            }
        }
        Ok(out)
    }

    /// Per-relationship differences between two cached runs. A missing or
    /// stale entry compares as empty.
    pub fn compare(&self, fingerprint_a: &str, fingerprint_b: &str, logic_version: &str) -> CacheComparison {
        let recs_a = self
            .get(fingerprint_a, logic_version)
            .map(|e| e.recommendations)
            .unwrap_or_default();
        let recs_b = self
            .get(fingerprint_b, logic_version)
            .map(|e| e.recommendations)
            .unwrap_or_default();

        let changes = diff_recommendations(&recs_a, &recs_b);
        CacheComparison {
            fingerprint_a: fingerprint_a.to_string(),
            fingerprint_b: fingerprint_b.to_string(),
            total_in_a: recs_a.len(),
            total_in_b: recs_b.len(),
            is_identical: changes.is_empty(),
            changes,
        }
    }
}

pub fn diff_recommendations(a: &[Recommendation], b: &[Recommendation]) -> Vec<RecommendationChange> {
    let map_a: BTreeMap<_, _> = a.iter().map(|r| (r.key(), r)).collect();
    let map_b: BTreeMap<_, _> = b.iter().map(|r| (r.key(), r)).collect();
    let keys: BTreeSet<_> = map_a.keys().chain(map_b.keys()).cloned().collect();

    let mut changes = Vec::new();
    for key in keys {
        let relationship = format!("{} -> {}", key.parent_table, key.child_table);
        match (map_a.get(&key), map_b.get(&key)) {
            (Some(ra), Some(rb)) => {
                if ra.decision != rb.decision {
                    changes.push(RecommendationChange::DecisionChanged {
                        relationship,
                        from: ra.decision.to_string(),
                        to: rb.decision.to_string(),
                    });
                } else if (ra.confidence - rb.confidence).abs() > CONFIDENCE_CHANGE_THRESHOLD {
                    changes.push(RecommendationChange::ConfidenceChanged {
                        relationship,
                        from: ra.confidence,
                        to: rb.confidence,
                    });
                }
            }
            (Some(_), None) => changes.push(RecommendationChange::Removed { relationship }),
            (None, Some(rb)) => changes.push(RecommendationChange::Added {
                relationship,
                decision: rb.decision.to_string(),
            }),
            (None, None) => {}
        }
    }
    changes
}
