use schema_travels::core::config::{CacheMode, EngineConfig};
use schema_travels::core::error::AdvisorError;
use schema_travels::core::events::{QueryEvent, TableTouch};
use schema_travels::core::schema_graph::{SchemaGraph, Table};
use schema_travels::engine::advisor::{AdvisorBridge, AdvisorRequest, AdvisorResponse};
use schema_travels::engine::analysis::analyze_with_hints;
use schema_travels::engine::cache::RecommendationCache;
use schema_travels::engine::decision::WARN_ESTIMATED_CARDINALITY;
use schema_travels::engine::recommend::RecommendationOrigin;
use schema_travels::engine::recommendation::{Decision, Recommendation, TargetStore};
use schema_travels::engine::relationship_stats::{CardinalityHints, CardinalitySource};
use schema_travels::{AnalysisResult, RecommendOptions, analyze, recommend};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MODEL: &str = "mock-advisor-1";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn shop_schema() -> SchemaGraph {
    SchemaGraph::new(vec![
        Table::new("users").with_primary_key(&["id"]),
        Table::new("orders").with_foreign_key(&["user_id"], "users"),
        Table::new("order_items").with_foreign_key(&["order_id"], "orders"),
        Table::new("audit_log").with_foreign_key(&["user_id"], "users"),
    ])
}

fn shop_events() -> Vec<QueryEvent> {
    let mut events = Vec::new();
    for i in 0..20 {
        events.push(QueryEvent::new(
            format!("detail{i}"),
            3.0,
            vec![TableTouch::read("orders"), TableTouch::read("order_items")],
        ));
    }
    for i in 0..5 {
        events.push(QueryEvent::new(
            format!("orders{i}"),
            1.0,
            vec![TableTouch::read("orders")],
        ));
    }
    for i in 0..15 {
        events.push(QueryEvent::new(
            format!("audit{i}"),
            0.5,
            vec![TableTouch::write("audit_log")],
        ));
    }
    events
}

fn shop_analysis() -> (SchemaGraph, AnalysisResult) {
    let schema = shop_schema();
    let analysis = analyze(&shop_events(), &schema).expect("analyze");
    (schema, analysis)
}

fn options(use_cache: bool, use_advisor: bool) -> RecommendOptions {
    RecommendOptions {
        use_cache,
        use_advisor,
        advisor_timeout: Duration::from_secs(5),
        ..RecommendOptions::default()
    }
}

/// Embeds every edge; leaves constraints empty so coverage fills them in.
struct EmbedEverything {
    delay: Duration,
}

impl AdvisorBridge for EmbedEverything {
    fn model_identifier(&self) -> String {
        MODEL.to_string()
    }

    fn advise(&self, request: &AdvisorRequest) -> Result<AdvisorResponse, AdvisorError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let recommendations = request
            .schema
            .relationships()
            .into_iter()
            .rev()
            .map(|key| Recommendation {
                parent_table: key.parent_table,
                child_table: key.child_table,
                constraint: String::new(),
                decision: Decision::Embed,
                confidence: 0.9,
                reasoning: vec!["advisor says so".to_string()],
                warnings: vec![],
                cardinality_source: Default::default(),
                metrics: BTreeMap::new(),
            })
            .collect();
        Ok(AdvisorResponse {
            recommendations,
            model_identifier: self.model_identifier(),
        })
    }
}

struct Broken;

impl AdvisorBridge for Broken {
    fn model_identifier(&self) -> String {
        "broken".to_string()
    }

    fn advise(&self, _request: &AdvisorRequest) -> Result<AdvisorResponse, AdvisorError> {
        Err(AdvisorError::Transport("connection refused".to_string()))
    }
}

/// Answers for the first edge only.
struct Partial;

impl AdvisorBridge for Partial {
    fn model_identifier(&self) -> String {
        "partial".to_string()
    }

    fn advise(&self, request: &AdvisorRequest) -> Result<AdvisorResponse, AdvisorError> {
        let full = EmbedEverything {
            delay: Duration::ZERO,
        }
        .advise(request)?;
        Ok(AdvisorResponse {
            recommendations: full.recommendations.into_iter().take(1).collect(),
            model_identifier: "partial".to_string(),
        })
    }
}

fn embed_everything() -> Option<Arc<dyn AdvisorBridge>> {
    Some(Arc::new(EmbedEverything {
        delay: Duration::ZERO,
    }))
}

#[test]
fn one_recommendation_per_edge_in_edge_order() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let cache = RecommendationCache::in_memory();

    let set = recommend(&analysis, &schema, TargetStore::MongoDb, &options(true, false), &cache, None)
        .expect("recommend");

    let edges = schema.relationships();
    assert_eq!(set.recommendations.len(), edges.len());
    for (rec, edge) in set.recommendations.iter().zip(&edges) {
        assert_eq!(&rec.key(), edge);
    }
    assert_eq!(set.origin, RecommendationOrigin::RuleBased);
    assert!(!set.is_degraded());
    assert_eq!(set.fingerprint.len(), 16);

    let items = set
        .recommendations
        .iter()
        .find(|r| r.child_table == "order_items")
        .expect("order_items edge");
    assert_eq!(items.decision, Decision::Embed);

    let audit = set
        .recommendations
        .iter()
        .find(|r| r.child_table == "audit_log")
        .expect("audit_log edge");
    assert_eq!(audit.decision, Decision::Reference);
}

#[test]
fn second_run_is_served_from_cache() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let cache = RecommendationCache::in_memory();
    let opts = options(true, false);

    let first = recommend(&analysis, &schema, TargetStore::MongoDb, &opts, &cache, None).expect("first");
    let second = recommend(&analysis, &schema, TargetStore::MongoDb, &opts, &cache, None).expect("second");

    assert_eq!(
        second.origin,
        RecommendationOrigin::Cache {
            model: String::new()
        }
    );
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.recommendations, second.recommendations);
}

#[test]
fn fresh_analysis_of_same_events_hits_the_cache() {
    init_logging();
    let schema = shop_schema();
    let cache = RecommendationCache::in_memory();
    let opts = options(true, false);

    let a = analyze(&shop_events(), &schema).expect("analyze");
    let mut reversed = shop_events();
    reversed.reverse();
    let b = analyze(&reversed, &schema).expect("analyze");

    recommend(&a, &schema, TargetStore::MongoDb, &opts, &cache, None).expect("first");
    let second = recommend(&b, &schema, TargetStore::MongoDb, &opts, &cache, None).expect("second");
    assert!(matches!(second.origin, RecommendationOrigin::Cache { .. }));
}

#[test]
fn bypassing_the_cache_still_writes_a_fresh_entry() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let cache = RecommendationCache::in_memory();
    let opts = options(true, false);

    recommend(&analysis, &schema, TargetStore::MongoDb, &opts, &cache, None).expect("seed");
    let bypass = recommend(&analysis, &schema, TargetStore::MongoDb, &options(false, false), &cache, None)
        .expect("bypass");
    assert_eq!(bypass.origin, RecommendationOrigin::RuleBased);

    cache.invalidate_all().expect("clear");
    recommend(&analysis, &schema, TargetStore::MongoDb, &options(false, false), &cache, None)
        .expect("bypass on empty cache");
    let entries = cache.list_entries().expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].fingerprint, bypass.fingerprint);
}

#[test]
fn logic_version_bump_recomputes() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let cache = RecommendationCache::in_memory();

    recommend(&analysis, &schema, TargetStore::MongoDb, &options(true, false), &cache, None).expect("seed");

    let bumped = RecommendOptions {
        logic_version: "99.0.0".to_string(),
        ..options(true, false)
    };
    let set = recommend(&analysis, &schema, TargetStore::MongoDb, &bumped, &cache, None).expect("bumped");
    assert_eq!(set.origin, RecommendationOrigin::RuleBased);

    let entries = cache.list_entries().expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].logic_version, "99.0.0");
}

#[test]
fn rule_based_output_is_byte_identical_across_runs() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let a = recommend(
        &analysis,
        &schema,
        TargetStore::MongoDb,
        &options(false, false),
        &RecommendationCache::in_memory(),
        None,
    )
    .expect("a");
    let b = recommend(
        &analysis,
        &schema,
        TargetStore::MongoDb,
        &options(false, false),
        &RecommendationCache::in_memory(),
        None,
    )
    .expect("b");
    assert_eq!(
        serde_json::to_string(&a.recommendations).expect("json"),
        serde_json::to_string(&b.recommendations).expect("json")
    );
}

#[test]
fn advisor_recommendations_are_used_and_cached_with_model() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let cache = RecommendationCache::in_memory();
    let opts = options(true, true);

    let set = recommend(&analysis, &schema, TargetStore::MongoDb, &opts, &cache, embed_everything())
        .expect("recommend");
    assert_eq!(
        set.origin,
        RecommendationOrigin::Advisor {
            model: MODEL.to_string()
        }
    );
    assert!(set.recommendations.iter().all(|r| r.decision == Decision::Embed));
    let edges = schema.relationships();
    for (rec, edge) in set.recommendations.iter().zip(&edges) {
        assert_eq!(&rec.key(), edge);
    }

    let entries = cache.list_entries().expect("list");
    assert_eq!(entries[0].advisor_model, MODEL);

    let again = recommend(&analysis, &schema, TargetStore::MongoDb, &opts, &cache, embed_everything())
        .expect("again");
    assert_eq!(
        again.origin,
        RecommendationOrigin::Cache {
            model: MODEL.to_string()
        }
    );
}

#[test]
fn rule_only_run_never_serves_advisor_entry() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let cache = RecommendationCache::in_memory();

    recommend(&analysis, &schema, TargetStore::MongoDb, &options(true, true), &cache, embed_everything())
        .expect("advisor run");

    let rules = recommend(&analysis, &schema, TargetStore::MongoDb, &options(true, false), &cache, None)
        .expect("rule run");
    assert_eq!(rules.origin, RecommendationOrigin::RuleBased);
    let audit = rules
        .recommendations
        .iter()
        .find(|r| r.child_table == "audit_log")
        .expect("audit_log edge");
    assert_eq!(audit.decision, Decision::Reference);
}

#[test]
fn advisor_failure_falls_back_with_warnings_and_is_not_cached() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let cache = RecommendationCache::in_memory();

    let rule_only = recommend(
        &analysis,
        &schema,
        TargetStore::MongoDb,
        &options(false, false),
        &RecommendationCache::in_memory(),
        None,
    )
    .expect("rules");

    let set = recommend(
        &analysis,
        &schema,
        TargetStore::MongoDb,
        &options(true, true),
        &cache,
        Some(Arc::new(Broken)),
    )
    .expect("degraded run still succeeds");

    assert!(matches!(set.degraded, Some(AdvisorError::Transport(_))));
    assert_eq!(set.origin, RecommendationOrigin::RuleBased);
    assert_eq!(set.recommendations.len(), rule_only.recommendations.len());
    for (degraded, plain) in set.recommendations.iter().zip(&rule_only.recommendations) {
        assert_eq!(degraded.decision, plain.decision);
        assert_eq!(degraded.confidence, plain.confidence);
        assert!(
            degraded.warnings.iter().any(|w| w.contains("advisor unavailable")),
            "missing fallback warning on {}",
            degraded.relationship_label()
        );
    }
    assert!(cache.list_entries().expect("list").is_empty());
}

#[test]
fn advisor_timeout_falls_back() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let cache = RecommendationCache::in_memory();
    let opts = RecommendOptions {
        advisor_timeout: Duration::from_millis(50),
        ..options(true, true)
    };
    let slow: Arc<dyn AdvisorBridge> = Arc::new(EmbedEverything {
        delay: Duration::from_secs(2),
    });

    let set = recommend(&analysis, &schema, TargetStore::MongoDb, &opts, &cache, Some(slow))
        .expect("recommend");
    assert!(matches!(set.degraded, Some(AdvisorError::Timeout(_))));
    assert!(set.recommendations.iter().all(|r| !r.warnings.is_empty()));
}

#[test]
fn missing_advisor_is_reported_as_unavailable() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let set = recommend(
        &analysis,
        &schema,
        TargetStore::MongoDb,
        &options(false, true),
        &RecommendationCache::in_memory(),
        None,
    )
    .expect("recommend");
    assert!(matches!(set.degraded, Some(AdvisorError::Unavailable(_))));
}

#[test]
fn incomplete_advisor_answer_is_rejected() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let set = recommend(
        &analysis,
        &schema,
        TargetStore::MongoDb,
        &options(false, true),
        &RecommendationCache::in_memory(),
        Some(Arc::new(Partial)),
    )
    .expect("recommend");
    assert!(matches!(set.degraded, Some(AdvisorError::Coverage(_))));
    assert_eq!(set.recommendations.len(), schema.relationships().len());
}

#[test]
fn analysis_from_another_schema_is_an_input_error() {
    init_logging();
    let (_, analysis) = shop_analysis();
    let other = SchemaGraph::new(vec![
        Table::new("users"),
        Table::new("sessions").with_foreign_key(&["user_id"], "users"),
    ]);
    let err = recommend(
        &analysis,
        &other,
        TargetStore::MongoDb,
        &options(false, false),
        &RecommendationCache::in_memory(),
        None,
    )
    .expect_err("should fail");
    assert_eq!(err.kind(), "input");
    assert!(err.is_fatal());
}

#[test]
fn target_store_and_cache_mode_partition_the_cache() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let cache = RecommendationCache::in_memory();

    let mongo = recommend(&analysis, &schema, TargetStore::MongoDb, &options(true, false), &cache, None)
        .expect("mongo");
    let dynamo = recommend(&analysis, &schema, TargetStore::DynamoDb, &options(true, false), &cache, None)
        .expect("dynamo");
    assert_ne!(mongo.fingerprint, dynamo.fingerprint);
    assert_eq!(dynamo.origin, RecommendationOrigin::RuleBased);

    let relaxed = RecommendOptions {
        cache_mode: CacheMode::Relaxed,
        ..options(true, false)
    };
    let relaxed_set = recommend(&analysis, &schema, TargetStore::MongoDb, &relaxed, &cache, None)
        .expect("relaxed");
    assert_ne!(relaxed_set.fingerprint, mongo.fingerprint);
    assert_eq!(cache.list_entries().expect("list").len(), 3);
}

#[test]
fn options_follow_engine_config() {
    let config = EngineConfig::from_toml_str(
        r#"
logic_version = "3.1.0"

[cache]
enabled = false
fingerprint_len = 32

[advisor]
enabled = true
timeout_secs = 7
"#,
    )
    .expect("config");
    let opts = RecommendOptions::from_config(&config);
    assert!(!opts.use_cache);
    assert!(opts.use_advisor);
    assert_eq!(opts.logic_version, "3.1.0");
    assert_eq!(opts.fingerprint_len, 32);
    assert_eq!(opts.advisor_timeout, Duration::from_secs(7));
}

#[test]
fn advisor_recommendations_carry_observed_stats() {
    init_logging();
    let schema = SchemaGraph::new(vec![
        Table::new("users").with_primary_key(&["id"]),
        Table::new("orders").with_foreign_key(&["user_id"], "users"),
        Table::new("order_items").with_foreign_key(&["order_id"], "orders"),
    ]);
    let events = vec![QueryEvent::new(
        "e1",
        1.0,
        vec![TableTouch::read("orders").with_row("o1", "users", "u1")],
    )];
    let hints = CardinalityHints::new().with("orders", "order_items", 40, 4.0);
    let analysis = analyze_with_hints(&events, &schema, &hints).expect("analyze");

    let set = recommend(
        &analysis,
        &schema,
        TargetStore::MongoDb,
        &options(false, true),
        &RecommendationCache::in_memory(),
        embed_everything(),
    )
    .expect("recommend");
    assert!(matches!(set.origin, RecommendationOrigin::Advisor { .. }));

    let orders = set
        .recommendations
        .iter()
        .find(|r| r.child_table == "orders")
        .expect("orders edge");
    assert_eq!(orders.cardinality_source, CardinalitySource::Observed);
    assert_eq!(orders.metrics["max_children_observed"], 1.0);
    assert!(orders.metrics.contains_key("co_access_ratio"));
    assert_eq!(orders.reasoning, vec!["advisor says so".to_string()]);

    let items = set
        .recommendations
        .iter()
        .find(|r| r.child_table == "order_items")
        .expect("order_items edge");
    assert_eq!(items.cardinality_source, CardinalitySource::Estimated);
    assert_eq!(items.metrics["max_children_observed"], 40.0);
    assert!(items.warnings.iter().any(|w| w == WARN_ESTIMATED_CARDINALITY));
}

#[test]
fn configured_advisor_model_must_match_the_bridge() {
    init_logging();
    let (schema, analysis) = shop_analysis();
    let cache = RecommendationCache::in_memory();

    let mut config = EngineConfig::default();
    config.advisor.model = "some-other-model".to_string();
    let opts = RecommendOptions {
        use_advisor: true,
        ..RecommendOptions::from_config(&config)
    };
    assert_eq!(opts.advisor_model, "some-other-model");

    let set = recommend(&analysis, &schema, TargetStore::MongoDb, &opts, &cache, embed_everything())
        .expect("recommend");
    assert!(matches!(set.degraded, Some(AdvisorError::Unavailable(_))));
    assert_eq!(set.origin, RecommendationOrigin::RuleBased);

    let matching = RecommendOptions {
        advisor_model: MODEL.to_string(),
        ..opts
    };
    let set = recommend(&analysis, &schema, TargetStore::MongoDb, &matching, &cache, embed_everything())
        .expect("recommend");
    assert_eq!(
        set.origin,
        RecommendationOrigin::Advisor {
            model: MODEL.to_string()
        }
    );
}
