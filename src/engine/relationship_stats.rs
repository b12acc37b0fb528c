//! Relationship Statistics Builder.
//!
//! For each foreign-key edge, classifies every event as touching the parent
//! only, the child only, both, or neither, and attaches per-table read/write
//! counts plus a cardinality figure. Per-table counts are computed once and
//! shared by all edges.

use crate::core::events::QueryEvent;
use crate::core::schema_graph::RelationshipKey;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `writes / max(1, writes + reads)`.
pub fn write_ratio(writes: u64, reads: u64) -> f64 {
    writes as f64 / (writes + reads).max(1) as f64
}

/// Which evidence backs `max_children_observed`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CardinalitySource {
    /// Distinct child rows per parent key seen in the event stream.
    Observed,
    /// Externally supplied fan-out hint (schema-declared or estimated).
    Estimated,
    /// Neither; cardinality reads as zero.
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardinalityHint {
    pub max: u64,
    pub avg: f64,
}

/// Fan-out hints. A hint registered for a constraint applies to that edge
/// only; a hint registered for a `(parent_table, child_table)` pair applies to
/// every edge between the two tables without its own. Observed data always
/// takes precedence over a hint.
#[derive(Debug, Clone, Default)]
pub struct CardinalityHints {
    by_pair: BTreeMap<(String, String), CardinalityHint>,
    by_constraint: BTreeMap<String, CardinalityHint>,
}

impl CardinalityHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent_table: &str, child_table: &str, max: u64, avg: f64) {
        self.by_pair.insert(
            (parent_table.to_string(), child_table.to_string()),
            CardinalityHint { max, avg },
        );
    }

    pub fn with(mut self, parent_table: &str, child_table: &str, max: u64, avg: f64) -> Self {
        self.insert(parent_table, child_table, max, avg);
        self
    }

    pub fn with_constraint(mut self, constraint: &str, max: u64, avg: f64) -> Self {
        self.by_constraint
            .insert(constraint.to_string(), CardinalityHint { max, avg });
        self
    }

    pub fn get(&self, key: &RelationshipKey) -> Option<CardinalityHint> {
        self.by_constraint
            .get(&key.constraint)
            .or_else(|| {
                self.by_pair
                    .get(&(key.parent_table.clone(), key.child_table.clone()))
            })
            .copied()
    }
}

/// Aggregate access counts for one table across the whole stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableAccess {
    pub reads: u64,
    pub writes: u64,
    /// Events touching only this table.
    pub solo_accesses: u64,
    /// Events touching this table and at least one other.
    pub joined_accesses: u64,
    pub total_duration_ms: f64,
}

impl TableAccess {
    pub fn write_ratio(&self) -> f64 {
        write_ratio(self.writes, self.reads)
    }

    pub fn total_operations(&self) -> u64 {
        self.reads + self.writes
    }

    pub fn is_read_heavy(&self) -> bool {
        self.total_operations() > 0 && 1.0 - self.write_ratio() > 0.7
    }

    pub fn is_write_heavy(&self) -> bool {
        self.write_ratio() > 0.5
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipStats {
    pub key: RelationshipKey,
    pub co_access_count: u64,
    pub parent_solo_count: u64,
    pub child_solo_count: u64,
    pub parent_write_count: u64,
    pub parent_read_count: u64,
    pub child_write_count: u64,
    pub child_read_count: u64,
    pub max_children_observed: u64,
    pub avg_children_observed: f64,
    pub cardinality_source: CardinalitySource,
}

impl RelationshipStats {
    /// Zeroed statistics for `key`.
    pub fn empty(key: RelationshipKey) -> Self {
        Self {
            key,
            co_access_count: 0,
            parent_solo_count: 0,
            child_solo_count: 0,
            parent_write_count: 0,
            parent_read_count: 0,
            child_write_count: 0,
            child_read_count: 0,
            max_children_observed: 0,
            avg_children_observed: 0.0,
            cardinality_source: CardinalitySource::Unknown,
        }
    }

    pub fn parent_table(&self) -> &str {
        &self.key.parent_table
    }

    pub fn child_table(&self) -> &str {
        &self.key.child_table
    }

    pub fn co_access_ratio(&self) -> f64 {
        let total = self.parent_solo_count + self.child_solo_count + self.co_access_count;
        self.co_access_count as f64 / total.max(1) as f64
    }

    pub fn child_solo_ratio(&self) -> f64 {
        let total = self.child_solo_count + self.co_access_count;
        self.child_solo_count as f64 / total.max(1) as f64
    }

    pub fn parent_solo_ratio(&self) -> f64 {
        let total = self.parent_solo_count + self.co_access_count;
        self.parent_solo_count as f64 / total.max(1) as f64
    }

    pub fn child_write_ratio(&self) -> f64 {
        write_ratio(self.child_write_count, self.child_read_count)
    }

    pub fn parent_write_ratio(&self) -> f64 {
        write_ratio(self.parent_write_count, self.parent_read_count)
    }
}

/// Per-table aggregates over the stream.
pub fn table_access(events: &[QueryEvent]) -> BTreeMap<String, TableAccess> {
    let mut access: BTreeMap<String, TableAccess> = BTreeMap::new();
    for event in events {
        let tables = event.tables();
        let solo = tables.len() == 1;
        let share = event.duration_ms / tables.len().max(1) as f64;
        for table in tables {
            let (read, write) = event.access_of(table);
            let entry = access.entry(table.to_string()).or_default();
            entry.reads += u64::from(read);
            entry.writes += u64::from(write);
            if solo {
                entry.solo_accesses += 1;
            } else {
                entry.joined_accesses += 1;
            }
            entry.total_duration_ms += share;
        }
    }
    access
}

/// One `RelationshipStats` per edge, in the order of `edges`.
pub fn build_relationship_stats(
    events: &[QueryEvent],
    edges: &[RelationshipKey],
    access: &BTreeMap<String, TableAccess>,
    hints: &CardinalityHints,
) -> Vec<RelationshipStats> {
    edges
        .par_iter()
        .map(|key| edge_stats(events, key, access, hints))
        .collect()
}

fn edge_stats(
    events: &[QueryEvent],
    key: &RelationshipKey,
    access: &BTreeMap<String, TableAccess>,
    hints: &CardinalityHints,
) -> RelationshipStats {
    let mut stats = RelationshipStats::empty(key.clone());

    for event in events {
        let touches_parent = event.touches_table(&key.parent_table);
        let touches_child = event.touches_table(&key.child_table);
        match (touches_parent, touches_child) {
            (true, true) => stats.co_access_count += 1,
            (true, false) => stats.parent_solo_count += 1,
            (false, true) => stats.child_solo_count += 1,
            (false, false) => {}
        }
    }

    if let Some(parent) = access.get(&key.parent_table) {
        stats.parent_read_count = parent.reads;
        stats.parent_write_count = parent.writes;
    }
    if let Some(child) = access.get(&key.child_table) {
        stats.child_read_count = child.reads;
        stats.child_write_count = child.writes;
    }

    if let Some((max, avg)) = observed_cardinality(events, key) {
        stats.max_children_observed = max;
        stats.avg_children_observed = avg;
        stats.cardinality_source = CardinalitySource::Observed;
    } else if let Some(hint) = hints.get(key) {
        stats.max_children_observed = hint.max;
        stats.avg_children_observed = hint.avg.max(0.0);
        stats.cardinality_source = CardinalitySource::Estimated;
    }

    stats
}

/// Distinct child rows per parent key, from touches that carry row identity.
fn observed_cardinality(events: &[QueryEvent], key: &RelationshipKey) -> Option<(u64, f64)> {
    let mut children: FxHashMap<&str, FxHashSet<&str>> = FxHashMap::default();

    for event in events {
        for touch in event.touches.iter().filter(|t| t.table == key.child_table) {
            let (Some(row_key), Some(parent_key)) = (
                touch.row_key.as_deref(),
                touch
                    .parent_refs
                    .get(&key.constraint)
                    .or_else(|| touch.parent_refs.get(&key.parent_table)),
            ) else {
                continue;
            };
            children
                .entry(parent_key.as_str())
                .or_default()
                .insert(row_key);
        }
    }

    if children.is_empty() {
        return None;
    }
    let max = children.values().map(|rows| rows.len() as u64).max().unwrap_or(0);
    let total: u64 = children.values().map(|rows| rows.len() as u64).sum();
    Some((max, total as f64 / children.len() as f64))
}
