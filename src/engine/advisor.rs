//! Boundary to an external model-backed advisor.
//!
//! The engine never depends on how an advisor reasons. It fixes the request
//! and response shape, enforces edge coverage on whatever comes back, and
//! bounds the call with a deadline. Any failure is an `AdvisorError`; the
//! caller falls back to the rule table.

use crate::core::error::AdvisorError;
use crate::core::schema_graph::{RelationshipKey, SchemaGraph};
use crate::engine::analysis::AnalysisResult;
use crate::engine::recommendation::{Decision, Recommendation, TargetStore};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const SUMMARY_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct AdvisorRequest {
    pub schema: SchemaGraph,
    pub analysis: AnalysisResult,
    pub target: TargetStore,
}

#[derive(Debug, Clone)]
pub struct AdvisorResponse {
    pub recommendations: Vec<Recommendation>,
    pub model_identifier: String,
}

pub trait AdvisorBridge: Send + Sync {
    fn model_identifier(&self) -> String;

    /// Must return one recommendation per foreign-key edge or fail.
    fn advise(&self, request: &AdvisorRequest) -> Result<AdvisorResponse, AdvisorError>;
}

impl AdvisorRequest {
    /// Deterministic text summary of the inputs, for model-backed advisors.
    pub fn prompt_context(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Target store: {}\n", self.target));
        out.push_str("\n## Source schema\n");
        for table in &self.schema.tables {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, c.data_type))
                .collect();
            out.push_str(&format!("- {}: {}\n", table.name, columns.join(", ")));
        }

        out.push_str("\nForeign keys:\n");
        for key in self.schema.relationships() {
            out.push_str(&format!("- {key}\n"));
        }

        out.push_str("\n## Access patterns\n");
        out.push_str(&format!("Total queries analyzed: {}\n", self.analysis.total_events));
        out.push_str("\nTop joins:\n");
        for join in self.analysis.join_patterns.iter().take(SUMMARY_LIMIT) {
            out.push_str(&format!(
                "- {} <-> {}: {} calls, {:.1}ms avg\n",
                join.table_a, join.table_b, join.count, join.avg_duration_ms
            ));
        }

        out.push_str("\nTable mutation patterns:\n");
        let mut tables: Vec<_> = self.analysis.table_access.iter().collect();
        tables.sort_by(|a, b| {
            b.1.total_operations()
                .cmp(&a.1.total_operations())
                .then_with(|| a.0.cmp(b.0))
        });
        for (name, access) in tables.into_iter().take(SUMMARY_LIMIT) {
            out.push_str(&format!(
                "- {}: reads={}, writes={} ({:.0}% write ratio)\n",
                name,
                access.reads,
                access.writes,
                access.write_ratio() * 100.0
            ));
        }

        out.push_str("\nRelationships:\n");
        for stats in &self.analysis.relationships {
            out.push_str(&format!(
                "- {} -> {}: co-access {:.0}%, child alone {:.0}%, child writes {:.0}%, max children {} ({:?})\n",
                stats.parent_table(),
                stats.child_table(),
                stats.co_access_ratio() * 100.0,
                stats.child_solo_ratio() * 100.0,
                stats.child_write_ratio() * 100.0,
                stats.max_children_observed,
                stats.cardinality_source
            ));
        }
        out
    }
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    recommendations: Vec<RawRecommendation>,
}

#[derive(Deserialize)]
struct RawRecommendation {
    parent_table: String,
    child_table: String,
    #[serde(default)]
    constraint: String,
    decision: String,
    confidence: f64,
    #[serde(default)]
    reasoning: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

/// Decodes the outermost JSON object of a free-form model reply.
pub fn parse_advisor_response(content: &str) -> Result<Vec<Recommendation>, AdvisorError> {
    let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) else {
        return Err(AdvisorError::MalformedResponse(
            "no JSON object in advisor response".to_string(),
        ));
    };
    if end < start {
        return Err(AdvisorError::MalformedResponse(
            "unbalanced JSON object in advisor response".to_string(),
        ));
    }

    let raw: RawResponse = serde_json::from_str(&content[start..=end])
        .map_err(|e| AdvisorError::MalformedResponse(e.to_string()))?;

    raw.recommendations
        .into_iter()
        .map(|r| -> Result<Recommendation, AdvisorError> {
            let decision: Decision = r
                .decision
                .parse()
                .map_err(AdvisorError::MalformedResponse)?;
            Ok(Recommendation {
                parent_table: r.parent_table,
                child_table: r.child_table,
                constraint: r.constraint,
                decision,
                confidence: r.confidence,
                reasoning: r.reasoning,
                warnings: r.warnings,
                cardinality_source: Default::default(),
                metrics: BTreeMap::new(),
            })
        })
        .collect()
}

/// Checks that `recommendations` cover `edges` exactly once each, fills in
/// constraints the advisor left empty when the table pair is unambiguous,
/// and returns them in edge order.
pub fn validate_coverage(
    recommendations: Vec<Recommendation>,
    edges: &[RelationshipKey],
) -> Result<Vec<Recommendation>, AdvisorError> {
    let edge_set: BTreeSet<&RelationshipKey> = edges.iter().collect();
    let mut by_key: BTreeMap<RelationshipKey, Recommendation> = BTreeMap::new();

    for mut rec in recommendations {
        if !(0.0..=1.0).contains(&rec.confidence) {
            return Err(AdvisorError::MalformedResponse(format!(
                "confidence {} out of range for {}",
                rec.confidence,
                rec.relationship_label()
            )));
        }
        if rec.constraint.is_empty() {
            let candidates: Vec<&RelationshipKey> = edges
                .iter()
                .filter(|k| k.parent_table == rec.parent_table && k.child_table == rec.child_table)
                .collect();
            match candidates.as_slice() {
                [only] => rec.constraint = only.constraint.clone(),
                [] => {
                    return Err(AdvisorError::Coverage(format!(
                        "unknown relationship {}",
                        rec.relationship_label()
                    )));
                }
                _ => {
                    return Err(AdvisorError::Coverage(format!(
                        "ambiguous relationship {} needs a constraint",
                        rec.relationship_label()
                    )));
                }
            }
        }

        let key = rec.key();
        if !edge_set.contains(&key) {
            return Err(AdvisorError::Coverage(format!("unknown relationship {key}")));
        }
        if by_key.insert(key.clone(), rec).is_some() {
            return Err(AdvisorError::Coverage(format!("duplicate recommendation for {key}")));
        }
    }

    let mut ordered = Vec::with_capacity(edges.len());
    for edge in edges {
        match by_key.remove(edge) {
            Some(rec) => ordered.push(rec),
            None => {
                return Err(AdvisorError::Coverage(format!(
                    "missing recommendation for {edge}"
                )));
            }
        }
    }
    Ok(ordered)
}

/// Runs the advisor on a worker thread and waits at most `timeout`. On
/// expiry the worker is abandoned and its late answer dropped.
pub fn call_with_timeout(
    advisor: Arc<dyn AdvisorBridge>,
    request: AdvisorRequest,
    timeout: Duration,
) -> Result<AdvisorResponse, AdvisorError> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("advisor-call".to_string())
        .spawn(move || {
            let _ = tx.send(advisor.advise(&request));
        })
        .map_err(|e| AdvisorError::Transport(format!("failed to spawn advisor call: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(AdvisorError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(AdvisorError::Transport(
            "advisor call ended without a response".to_string(),
        )),
    }
}
