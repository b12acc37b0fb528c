use schema_travels::analyze;
use schema_travels::core::events::{QueryEvent, TableTouch};
use schema_travels::core::schema_graph::{SchemaGraph, Table};
use schema_travels::engine::analysis::analyze_with_hints;
use schema_travels::engine::relationship_stats::{CardinalityHints, CardinalitySource};

fn shop_schema() -> SchemaGraph {
    SchemaGraph::new(vec![
        Table::new("users").with_column("id", "integer").with_primary_key(&["id"]),
        Table::new("orders")
            .with_column("id", "integer")
            .with_column("user_id", "integer")
            .with_foreign_key(&["user_id"], "users"),
        Table::new("order_items")
            .with_column("id", "integer")
            .with_column("order_id", "integer")
            .with_foreign_key(&["order_id"], "orders"),
        Table::new("products").with_column("id", "integer"),
        Table::new("reviews")
            .with_foreign_key(&["product_id"], "products")
            .with_foreign_key(&["user_id"], "users"),
    ])
}

fn reads(id: &str, duration_ms: f64, tables: &[&str]) -> QueryEvent {
    QueryEvent::new(
        id,
        duration_ms,
        tables.iter().map(|t| TableTouch::read(t)).collect(),
    )
}

#[test]
fn every_foreign_key_edge_gets_exactly_one_stats_entry() {
    let schema = shop_schema();
    let events = vec![
        reads("q1", 3.0, &["orders", "order_items"]),
        reads("q2", 1.0, &["users"]),
        reads("q3", 2.0, &["reviews", "products"]),
    ];
    let result = analyze(&events, &schema).expect("analyze");

    let edges = schema.relationships();
    assert_eq!(result.relationships.len(), edges.len());
    for edge in &edges {
        assert!(result.relationship(edge).is_some(), "missing stats for {edge}");
    }
    assert_eq!(result.total_events, 3);
}

#[test]
fn three_table_event_yields_three_pairs_of_count_one() {
    let schema = shop_schema();
    let events = vec![reads("q1", 6.0, &["users", "orders", "order_items"])];
    let result = analyze(&events, &schema).expect("analyze");

    assert_eq!(result.join_patterns.len(), 3);
    for (x, y) in [
        ("users", "orders"),
        ("users", "order_items"),
        ("orders", "order_items"),
    ] {
        let join = result.join_between(x, y).expect("pair present");
        assert_eq!(join.count, 1);
        assert_eq!(join.total_duration_ms, 6.0);
    }
}

#[test]
fn co_access_and_solo_counts_follow_the_event_stream() {
    let schema = shop_schema();
    let mut events = Vec::new();
    for i in 0..8 {
        events.push(reads(&format!("co{i}"), 2.0, &["orders", "order_items"]));
    }
    events.push(reads("p1", 1.0, &["orders"]));
    events.push(QueryEvent::new(
        "c1",
        1.0,
        vec![TableTouch::write("order_items")],
    ));

    let result = analyze(&events, &schema).expect("analyze");
    let stats = result
        .relationship_between("orders", "order_items")
        .expect("edge present");
    assert_eq!(stats.co_access_count, 8);
    assert_eq!(stats.parent_solo_count, 1);
    assert_eq!(stats.child_solo_count, 1);
    assert_eq!(stats.child_write_count, 1);
    assert_eq!(stats.child_read_count, 8);
    assert!((stats.co_access_ratio() - 0.8).abs() < 1e-12);

    let untouched = result
        .relationship_between("products", "reviews")
        .expect("edge present");
    assert_eq!(untouched.co_access_count, 0);
    assert_eq!(untouched.cardinality_source, CardinalitySource::Unknown);
}

#[test]
fn self_referencing_edge_counts_touches_as_co_access() {
    let schema = SchemaGraph::new(vec![
        Table::new("employees").with_foreign_key(&["manager_id"], "employees"),
    ]);
    let events = vec![
        reads("q1", 1.0, &["employees"]),
        reads("q2", 1.0, &["employees"]),
    ];
    let result = analyze(&events, &schema).expect("analyze");
    let stats = &result.relationships[0];
    assert!(stats.key.is_self_reference());
    assert_eq!(stats.co_access_count, 2);
    assert_eq!(stats.parent_solo_count, 0);
    assert_eq!(stats.child_solo_count, 0);
    assert!(result.join_patterns.is_empty());
}

#[test]
fn observed_cardinality_overrides_hints() {
    let schema = shop_schema();
    let events: Vec<QueryEvent> = (0..4)
        .map(|i| {
            QueryEvent::new(
                format!("q{i}"),
                1.0,
                vec![
                    TableTouch::read("orders"),
                    TableTouch::read("order_items").with_row(&format!("i{i}"), "orders", "o1"),
                ],
            )
        })
        .collect();
    let hints = CardinalityHints::new()
        .with("orders", "order_items", 10_000, 500.0)
        .with("users", "orders", 3, 2.0);

    let result = analyze_with_hints(&events, &schema, &hints).expect("analyze");
    let items = result
        .relationship_between("orders", "order_items")
        .expect("edge present");
    assert_eq!(items.cardinality_source, CardinalitySource::Observed);
    assert_eq!(items.max_children_observed, 4);

    let orders = result
        .relationship_between("users", "orders")
        .expect("edge present");
    assert_eq!(orders.cardinality_source, CardinalitySource::Estimated);
    assert_eq!(orders.max_children_observed, 3);
}

#[test]
fn invalid_event_aborts_analysis() {
    let events = vec![reads("bad", f64::NAN, &["users"])];
    let err = analyze(&events, &shop_schema()).expect_err("should fail");
    assert_eq!(err.kind(), "input");
}

#[test]
fn table_access_tracks_reads_writes_and_solo_use() {
    let events = vec![
        reads("q1", 4.0, &["users"]),
        QueryEvent::new(
            "q2",
            4.0,
            vec![TableTouch::write("users"), TableTouch::read("orders")],
        ),
    ];
    let result = analyze(&events, &shop_schema()).expect("analyze");
    let users = &result.table_access["users"];
    assert_eq!(users.reads, 1);
    assert_eq!(users.writes, 1);
    assert_eq!(users.solo_accesses, 1);
    assert_eq!(users.joined_accesses, 1);
    assert_eq!(users.total_duration_ms, 6.0);
    assert_eq!(result.write_heavy_tables(0.4), vec!["users"]);
}

#[test]
fn analysis_result_round_trips_through_json() {
    let events = vec![reads("q1", 2.0, &["orders", "order_items"])];
    let result = analyze(&events, &shop_schema()).expect("analyze");
    let json = serde_json::to_string(&result).expect("serialize");
    let back: schema_travels::AnalysisResult = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, result);
}
