//! Rule-based decision engine.
//!
//! `RelationshipStats -> Recommendation` through a flat, ordered rule table.
//! Rules are tried top to bottom and the first match wins; there is no rule
//! combination. The function is pure, so identical stats always produce an
//! identical recommendation.

use crate::core::config::DecisionThresholds;
use crate::engine::recommendation::{Decision, Recommendation};
use crate::engine::relationship_stats::{CardinalitySource, RelationshipStats};
use std::collections::BTreeMap;

pub const WARN_NO_CO_ACCESS: &str = "no observed co-access; recommendation is speculative";
pub const WARN_ESTIMATED_CARDINALITY: &str =
    "child cardinality is estimated from a hint, not observed in the query stream";

const EMBED_MIN_CONFIDENCE: f64 = 0.70;
const EMBED_MAX_CONFIDENCE: f64 = 0.95;

pub struct Outcome {
    pub decision: Decision,
    pub confidence: f64,
    pub reasoning: Vec<String>,
}

/// One row of the rule table.
pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&RelationshipStats, &DecisionThresholds) -> bool,
    pub outcome: fn(&RelationshipStats, &DecisionThresholds) -> Outcome,
}

static RULES: [Rule; 5] = [
    Rule {
        name: "unbounded_cardinality",
        matches: |s, t| s.max_children_observed > t.unbounded_children,
        outcome: |s, t| Outcome {
            decision: Decision::Reference,
            confidence: 0.95,
            reasoning: vec![
                "unbounded child cardinality".to_string(),
                format!(
                    "max children per parent {} > {}",
                    s.max_children_observed, t.unbounded_children
                ),
            ],
        },
    },
    Rule {
        name: "co_accessed_and_stable",
        matches: |s, t| {
            s.co_access_ratio() > t.embed_co_access_ratio
                && s.child_write_ratio() < t.embed_max_child_write_ratio
                && s.max_children_observed < t.embed_max_children
        },
        outcome: |s, t| Outcome {
            decision: Decision::Embed,
            confidence: embed_confidence(s.co_access_ratio(), t.embed_co_access_ratio),
            reasoning: vec![
                format!(
                    "co-access ratio {:.2} > {:.2}",
                    s.co_access_ratio(),
                    t.embed_co_access_ratio
                ),
                format!(
                    "child write ratio {:.2} < {:.2}",
                    s.child_write_ratio(),
                    t.embed_max_child_write_ratio
                ),
                format!(
                    "max children per parent {} < {}",
                    s.max_children_observed, t.embed_max_children
                ),
            ],
        },
    },
    Rule {
        name: "independent_child",
        matches: |s, t| s.child_solo_ratio() > t.independent_child_solo_ratio,
        outcome: |s, _| Outcome {
            decision: Decision::Reference,
            confidence: 0.80,
            reasoning: vec![
                "child frequently accessed independently of parent".to_string(),
                format!(
                    "{} accessed alone {:.0}% of the time",
                    s.child_table(),
                    s.child_solo_ratio() * 100.0
                ),
            ],
        },
    },
    Rule {
        name: "mutable_child",
        matches: |s, t| s.child_write_ratio() > t.mutable_child_write_ratio,
        outcome: |s, _| Outcome {
            decision: Decision::Reference,
            confidence: 0.75,
            reasoning: vec![
                "child mutated too frequently for safe embedding".to_string(),
                format!(
                    "{} write ratio {:.2}",
                    s.child_table(),
                    s.child_write_ratio()
                ),
            ],
        },
    },
    Rule {
        name: "default",
        matches: |_, _| true,
        outcome: |_, _| Outcome {
            decision: Decision::Reference,
            confidence: 0.60,
            reasoning: vec!["insufficient signal; defaulting to the safer normalized form".to_string()],
        },
    },
];

pub fn rule_table() -> &'static [Rule] {
    &RULES
}

/// Linear from 0.70 at the threshold to 0.95 at a co-access ratio of 1.0.
fn embed_confidence(co_access_ratio: f64, threshold: f64) -> f64 {
    let span = 1.0 - threshold;
    if span <= f64::EPSILON {
        return EMBED_MAX_CONFIDENCE;
    }
    let scaled = EMBED_MIN_CONFIDENCE
        + (EMBED_MAX_CONFIDENCE - EMBED_MIN_CONFIDENCE) * (co_access_ratio - threshold) / span;
    scaled.clamp(EMBED_MIN_CONFIDENCE, EMBED_MAX_CONFIDENCE)
}

/// Name of the first rule matching `stats`.
pub fn matching_rule(stats: &RelationshipStats, thresholds: &DecisionThresholds) -> &'static str {
    RULES
        .iter()
        .find(|rule| (rule.matches)(stats, thresholds))
        .map(|rule| rule.name)
        .unwrap_or("default")
}

pub fn decide(stats: &RelationshipStats) -> Recommendation {
    decide_with(stats, &DecisionThresholds::default())
}

pub fn decide_with(stats: &RelationshipStats, thresholds: &DecisionThresholds) -> Recommendation {
    let outcome = RULES
        .iter()
        .find(|rule| (rule.matches)(stats, thresholds))
        .map(|rule| (rule.outcome)(stats, thresholds))
        .unwrap_or_else(|| (RULES[RULES.len() - 1].outcome)(stats, thresholds));

    let mut warnings = Vec::new();
    if stats.co_access_count == 0 {
        warnings.push(WARN_NO_CO_ACCESS.to_string());
    }

    let mut rec = Recommendation {
        parent_table: stats.key.parent_table.clone(),
        child_table: stats.key.child_table.clone(),
        constraint: stats.key.constraint.clone(),
        decision: outcome.decision,
        confidence: outcome.confidence.clamp(0.0, 1.0),
        reasoning: outcome.reasoning,
        warnings,
        cardinality_source: stats.cardinality_source,
        metrics: BTreeMap::new(),
    };
    attach_stats(&mut rec, stats);
    rec
}

/// Stamps the observed figures for `stats` onto `rec`, whoever made the
/// decision. Existing warnings are kept.
pub(crate) fn attach_stats(rec: &mut Recommendation, stats: &RelationshipStats) {
    rec.cardinality_source = stats.cardinality_source;
    rec.metrics = metrics(stats);
    if stats.cardinality_source == CardinalitySource::Estimated
        && !rec.warnings.iter().any(|w| w == WARN_ESTIMATED_CARDINALITY)
    {
        rec.warnings.push(WARN_ESTIMATED_CARDINALITY.to_string());
    }
}

pub fn decide_all(stats: &[RelationshipStats], thresholds: &DecisionThresholds) -> Vec<Recommendation> {
    stats.iter().map(|s| decide_with(s, thresholds)).collect()
}

fn metrics(stats: &RelationshipStats) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    metrics.insert("co_access_ratio".to_string(), stats.co_access_ratio());
    metrics.insert("child_solo_ratio".to_string(), stats.child_solo_ratio());
    metrics.insert("parent_solo_ratio".to_string(), stats.parent_solo_ratio());
    metrics.insert("child_write_ratio".to_string(), stats.child_write_ratio());
    metrics.insert("parent_write_ratio".to_string(), stats.parent_write_ratio());
    metrics.insert(
        "max_children_observed".to_string(),
        stats.max_children_observed as f64,
    );
    metrics
}
