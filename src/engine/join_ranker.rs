//! Join Ranker: table pairs observed together, ranked by frequency and cost.
//!
//! Every unordered pair of distinct tables touched by one event counts as a
//! join of that pair. The log does not say which pairs were structurally
//! joined, so join cost is attributed to all C(k,2) pairs of a k-table event.

use crate::core::events::QueryEvent;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinPattern {
    /// Lexicographically smaller table of the pair.
    pub table_a: String,
    pub table_b: String,
    pub count: u64,
    pub total_duration_ms: f64,
    pub avg_duration_ms: f64,
}

impl JoinPattern {
    pub fn pair_name(&self) -> String {
        format!("{}|{}", self.table_a, self.table_b)
    }

    pub fn is_pair(&self, x: &str, y: &str) -> bool {
        (self.table_a == x && self.table_b == y) || (self.table_a == y && self.table_b == x)
    }
}

#[derive(Default)]
struct PairAccumulator {
    count: u64,
    total_duration_ms: f64,
}

/// Ranks joins: count desc, then cumulative duration desc, then pair name asc.
pub fn rank_joins(events: &[QueryEvent]) -> Vec<JoinPattern> {
    let mut pairs: FxHashMap<(String, String), PairAccumulator> = FxHashMap::default();

    for event in events {
        let tables = event.tables();
        for (i, a) in tables.iter().enumerate() {
            for b in &tables[i + 1..] {
                let acc = pairs
                    .entry((a.to_string(), b.to_string()))
                    .or_default();
                acc.count += 1;
                acc.total_duration_ms += event.duration_ms;
            }
        }
    }

    let mut ranked: Vec<JoinPattern> = pairs
        .into_iter()
        .map(|((table_a, table_b), acc)| JoinPattern {
            table_a,
            table_b,
            count: acc.count,
            total_duration_ms: acc.total_duration_ms,
            avg_duration_ms: acc.total_duration_ms / acc.count.max(1) as f64,
        })
        .collect();
    ranked.sort_by(compare_rank);
    ranked
}

pub(crate) fn compare_rank(x: &JoinPattern, y: &JoinPattern) -> Ordering {
    y.count
        .cmp(&x.count)
        .then_with(|| y.total_duration_ms.total_cmp(&x.total_duration_ms))
        .then_with(|| x.table_a.cmp(&y.table_a))
        .then_with(|| x.table_b.cmp(&y.table_b))
}
