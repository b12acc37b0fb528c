//! Combines the Join Ranker and the Relationship Statistics Builder into one
//! `AnalysisResult`, the unit handed to the decision engine, the advisor and
//! the fingerprint.

use crate::core::error::EngineError;
use crate::core::events::{QueryEvent, validate_events};
use crate::core::schema_graph::{RelationshipKey, SchemaGraph};
use crate::core::time;
use crate::engine::join_ranker::{JoinPattern, rank_joins};
use crate::engine::relationship_stats::{
    CardinalityHints, RelationshipStats, TableAccess, build_relationship_stats, table_access,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CANDIDATE_CO_ACCESS_RATIO: f64 = 0.7;
const CANDIDATE_MAX_CHILD_WRITE_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub analysis_id: String,
    pub created_at: String,
    pub total_events: u64,
    pub join_patterns: Vec<JoinPattern>,
    /// One entry per foreign-key edge of the analyzed schema.
    pub relationships: Vec<RelationshipStats>,
    pub table_access: BTreeMap<String, TableAccess>,
    /// Edges with high co-access and a child that is not write-heavy.
    pub embedding_candidates: u64,
}

impl AnalysisResult {
    pub fn relationship(&self, key: &RelationshipKey) -> Option<&RelationshipStats> {
        self.relationships.iter().find(|r| &r.key == key)
    }

    /// First relationship between `parent` and `child`, whatever its constraint.
    pub fn relationship_between(&self, parent: &str, child: &str) -> Option<&RelationshipStats> {
        self.relationships
            .iter()
            .find(|r| r.key.parent_table == parent && r.key.child_table == child)
    }

    pub fn join_between(&self, x: &str, y: &str) -> Option<&JoinPattern> {
        self.join_patterns.iter().find(|j| j.is_pair(x, y))
    }

    pub fn write_heavy_tables(&self, threshold: f64) -> Vec<&str> {
        self.table_access
            .iter()
            .filter(|(_, a)| a.write_ratio() > threshold)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

pub fn analyze(events: &[QueryEvent], schema: &SchemaGraph) -> Result<AnalysisResult, EngineError> {
    analyze_with_hints(events, schema, &CardinalityHints::new())
}

/// Full analysis. The two reductions share only the read-only event slice
/// and run in parallel.
pub fn analyze_with_hints(
    events: &[QueryEvent],
    schema: &SchemaGraph,
    hints: &CardinalityHints,
) -> Result<AnalysisResult, EngineError> {
    schema.validate()?;
    validate_events(events)?;

    let edges = schema.relationships();
    let (join_patterns, (table_access, relationships)) = rayon::join(
        || rank_joins(events),
        || {
            let access = table_access(events);
            let relationships = build_relationship_stats(events, &edges, &access, hints);
            (access, relationships)
        },
    );

    let embedding_candidates = relationships
        .iter()
        .filter(|r| {
            r.co_access_ratio() >= CANDIDATE_CO_ACCESS_RATIO
                && r.child_write_ratio() <= CANDIDATE_MAX_CHILD_WRITE_RATIO
        })
        .count() as u64;

    let result = AnalysisResult {
        analysis_id: time::new_analysis_id(),
        created_at: time::now_epoch_z(),
        total_events: events.len() as u64,
        join_patterns,
        relationships,
        table_access,
        embedding_candidates,
    };

    log::info!(
        "analyzed {} events: {} join pairs, {} relationships, {} embedding candidates",
        result.total_events,
        result.join_patterns.len(),
        result.relationships.len(),
        result.embedding_candidates
    );
    Ok(result)
}
