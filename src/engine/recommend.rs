//! `recommend`: analysis + schema -> one recommendation per foreign-key edge.
//!
//! Order of work: fingerprint, cache lookup (unless bypassed), rule table,
//! optional advisor on a miss, cache write. Advisor failures degrade to the
//! rule-based output with a warning on every recommendation; degraded output
//! is returned but never cached.

use crate::core::config::{CacheMode, DecisionThresholds, EngineConfig};
use crate::core::error::{AdvisorError, EngineError, InputError};
use crate::core::schema_graph::{RelationshipKey, SchemaGraph};
use crate::engine::advisor::{self, AdvisorBridge, AdvisorRequest};
use crate::engine::analysis::AnalysisResult;
use crate::engine::cache::{CacheEntry, RecommendationCache};
use crate::engine::decision;
use crate::engine::fingerprint;
use crate::engine::recommendation::{Recommendation, TargetStore};
use crate::engine::relationship_stats::RelationshipStats;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RecommendOptions {
    /// `false` skips the lookup; a fresh entry is still written.
    pub use_cache: bool,
    /// `false` forces rule-based output.
    pub use_advisor: bool,
    pub logic_version: String,
    pub cache_mode: CacheMode,
    pub fingerprint_len: usize,
    pub advisor_timeout: Duration,
    /// Expected advisor model; empty accepts whatever the bridge serves.
    pub advisor_model: String,
    pub thresholds: DecisionThresholds,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RecommendOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            use_cache: config.cache.enabled,
            use_advisor: config.advisor.enabled,
            logic_version: config.logic_version.clone(),
            cache_mode: config.cache.mode,
            fingerprint_len: config.cache.fingerprint_len,
            advisor_timeout: Duration::from_secs(config.advisor.timeout_secs),
            advisor_model: config.advisor.model.clone(),
            thresholds: config.rules.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationOrigin {
    RuleBased,
    Advisor { model: String },
    Cache { model: String },
}

#[derive(Debug, Clone)]
pub struct RecommendationSet {
    pub fingerprint: String,
    pub recommendations: Vec<Recommendation>,
    pub origin: RecommendationOrigin,
    /// Advisor failure that was recovered by falling back to the rule table.
    pub degraded: Option<AdvisorError>,
}

impl RecommendationSet {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

pub fn advisor_fallback_warning(err: &AdvisorError) -> String {
    format!(
        "advisor unavailable ({}): {}; using rule-based decision",
        err.kind(),
        err
    )
}

/// Stats for every schema edge, in edge order. The analysis must have been
/// produced from the same schema.
fn stats_for_edges<'a>(
    analysis: &'a AnalysisResult,
    edges: &[RelationshipKey],
) -> Result<Vec<&'a RelationshipStats>, InputError> {
    let analyzed: BTreeSet<&RelationshipKey> = analysis.relationships.iter().map(|r| &r.key).collect();
    let expected: BTreeSet<&RelationshipKey> = edges.iter().collect();
    if analyzed != expected {
        let missing: Vec<String> = expected.difference(&analyzed).map(|k| k.to_string()).collect();
        let extra: Vec<String> = analyzed.difference(&expected).map(|k| k.to_string()).collect();
        return Err(InputError::AnalysisSchemaMismatch(format!(
            "missing [{}], unexpected [{}]",
            missing.join(", "),
            extra.join(", ")
        )));
    }
    Ok(edges
        .iter()
        .filter_map(|edge| analysis.relationship(edge))
        .collect())
}

pub fn recommend(
    analysis: &AnalysisResult,
    schema: &SchemaGraph,
    target: TargetStore,
    options: &RecommendOptions,
    cache: &RecommendationCache,
    advisor: Option<Arc<dyn AdvisorBridge>>,
) -> Result<RecommendationSet, EngineError> {
    schema.validate()?;
    let edges = schema.relationships();
    let stats = stats_for_edges(analysis, &edges)?;

    let fingerprint = fingerprint::fingerprint(
        schema,
        analysis,
        target,
        options.cache_mode,
        options.fingerprint_len,
    )?;

    if options.use_cache {
        if let Some(entry) = cache.get(&fingerprint, &options.logic_version) {
            if entry.is_advisor_backed() == options.use_advisor {
                return Ok(RecommendationSet {
                    fingerprint,
                    origin: RecommendationOrigin::Cache {
                        model: entry.advisor_model_identifier,
                    },
                    recommendations: entry.recommendations,
                    degraded: None,
                });
            }
            log::debug!("cached entry {fingerprint} has other advisor provenance, recomputing");
        }
    }

    let rule_based: Vec<Recommendation> = stats
        .iter()
        .map(|s| decision::decide_with(s, &options.thresholds))
        .collect();

    let (recommendations, origin, degraded) = if options.use_advisor {
        match consult_advisor(analysis, schema, target, options, advisor, &edges, &stats) {
            Ok((recs, model)) => (recs, RecommendationOrigin::Advisor { model }, None),
            Err(err) => {
                log::warn!("advisor failed, falling back to rule-based decisions: {err}");
                let warning = advisor_fallback_warning(&err);
                let recs = rule_based
                    .into_iter()
                    .map(|mut r| {
                        r.warnings.push(warning.clone());
                        r
                    })
                    .collect();
                (recs, RecommendationOrigin::RuleBased, Some(err))
            }
        }
    } else {
        (rule_based, RecommendationOrigin::RuleBased, None)
    };

    if degraded.is_none() {
        let model = match &origin {
            RecommendationOrigin::Advisor { model } => model.as_str(),
            _ => "",
        };
        let entry = CacheEntry::new(
            &fingerprint,
            &options.logic_version,
            model,
            target,
            recommendations.clone(),
        );
        if let Err(e) = cache.put(&fingerprint, entry) {
            log::warn!("failed to cache recommendations {fingerprint}: {e}");
        }
    }

    Ok(RecommendationSet {
        fingerprint,
        recommendations,
        origin,
        degraded,
    })
}

fn consult_advisor(
    analysis: &AnalysisResult,
    schema: &SchemaGraph,
    target: TargetStore,
    options: &RecommendOptions,
    bridge: Option<Arc<dyn AdvisorBridge>>,
    edges: &[RelationshipKey],
    stats: &[&RelationshipStats],
) -> Result<(Vec<Recommendation>, String), AdvisorError> {
    let bridge = bridge
        .ok_or_else(|| AdvisorError::Unavailable("no advisor configured".to_string()))?;
    let configured = options.advisor_model.trim();
    if !configured.is_empty() && bridge.model_identifier() != configured {
        return Err(AdvisorError::Unavailable(format!(
            "configured model '{configured}' but bridge serves '{}'",
            bridge.model_identifier()
        )));
    }
    let request = AdvisorRequest {
        schema: schema.clone(),
        analysis: analysis.clone(),
        target,
    };
    let response = advisor::call_with_timeout(bridge, request, options.advisor_timeout)?;

    // An empty identifier would make the cached entry look rule-based.
    if response.model_identifier.trim().is_empty() {
        return Err(AdvisorError::MalformedResponse(
            "advisor returned an empty model identifier".to_string(),
        ));
    }
    let mut recommendations = advisor::validate_coverage(response.recommendations, edges)?;
    // Coverage output is in edge order, as is `stats`.
    for (rec, stats) in recommendations.iter_mut().zip(stats) {
        decision::attach_stats(rec, stats);
    }
    Ok((recommendations, response.model_identifier))
}
