//! Content fingerprint of (schema graph, analysis result, target store).
//!
//! Inputs are first mapped onto canonical structures: maps are `BTreeMap`s,
//! collections are sorted by a fixed key, identity fields (`analysis_id`,
//! `created_at`) are dropped and durations become integer microseconds so the
//! order in which events were summed cannot leak into the bytes.

use crate::core::canonical;
use crate::core::config::CacheMode;
use crate::core::schema_graph::{SchemaGraph, constraint_name};
use crate::engine::analysis::AnalysisResult;
use crate::engine::join_ranker::{JoinPattern, compare_rank};
use crate::engine::recommendation::TargetStore;
use crate::engine::relationship_stats::{CardinalitySource, TableAccess};
use serde::Serialize;
use std::collections::BTreeMap;

const HOT_JOIN_LIMIT: usize = 10;
const WRITE_HEAVY_RATIO: f64 = 0.4;
const READ_HEAVY_RATIO: f64 = 0.2;

#[derive(Serialize)]
struct CanonicalColumn<'a> {
    name: &'a str,
    data_type: &'a str,
    nullable: bool,
}

#[derive(Serialize, PartialEq, Eq, PartialOrd, Ord)]
struct CanonicalForeignKey<'a> {
    constraint: String,
    columns: &'a [String],
    parent_table: &'a str,
    parent_columns: &'a [String],
}

#[derive(Serialize)]
struct CanonicalTable<'a> {
    name: &'a str,
    columns: Vec<CanonicalColumn<'a>>,
    primary_key: Vec<&'a str>,
    foreign_keys: Vec<CanonicalForeignKey<'a>>,
}

#[derive(Serialize)]
struct CanonicalJoin<'a> {
    table_a: &'a str,
    table_b: &'a str,
    count: u64,
    total_duration_us: u64,
}

#[derive(Serialize)]
struct CanonicalRelationship<'a> {
    parent_table: &'a str,
    child_table: &'a str,
    constraint: &'a str,
    co_access_count: u64,
    parent_solo_count: u64,
    child_solo_count: u64,
    parent_write_count: u64,
    parent_read_count: u64,
    child_write_count: u64,
    child_read_count: u64,
    max_children_observed: u64,
    avg_children_observed_milli: u64,
    cardinality_source: CardinalitySource,
}

#[derive(Serialize)]
struct CanonicalTableAccess {
    reads: u64,
    writes: u64,
    solo_accesses: u64,
    joined_accesses: u64,
    total_duration_us: u64,
}

#[derive(Serialize)]
struct StrictInput<'a> {
    mode: &'static str,
    target: &'static str,
    tables: Vec<CanonicalTable<'a>>,
    total_events: u64,
    join_patterns: Vec<CanonicalJoin<'a>>,
    relationships: Vec<CanonicalRelationship<'a>>,
    table_access: BTreeMap<&'a str, CanonicalTableAccess>,
}

#[derive(Serialize)]
struct RelaxedInput<'a> {
    mode: &'static str,
    target: &'static str,
    tables: Vec<CanonicalTable<'a>>,
    join_pairs: Vec<(&'a str, &'a str)>,
    hot_join_pairs: Vec<(&'a str, &'a str)>,
    write_heavy_tables: Vec<&'a str>,
    read_heavy_tables: Vec<&'a str>,
}

fn micros(ms: f64) -> u64 {
    (ms * 1000.0).round().max(0.0) as u64
}

fn canonical_tables(schema: &SchemaGraph) -> Vec<CanonicalTable<'_>> {
    let mut tables: Vec<CanonicalTable<'_>> = schema
        .tables
        .iter()
        .map(|table| {
            let mut columns: Vec<CanonicalColumn<'_>> = table
                .columns
                .iter()
                .map(|c| CanonicalColumn {
                    name: &c.name,
                    data_type: &c.data_type,
                    nullable: c.nullable,
                })
                .collect();
            columns.sort_by(|a, b| a.name.cmp(b.name));

            let mut primary_key: Vec<&str> = table.primary_key.iter().map(String::as_str).collect();
            primary_key.sort_unstable();

            let mut foreign_keys: Vec<CanonicalForeignKey<'_>> = table
                .foreign_keys
                .iter()
                .map(|fk| CanonicalForeignKey {
                    constraint: constraint_name(&table.name, fk),
                    columns: &fk.columns,
                    parent_table: &fk.parent_table,
                    parent_columns: &fk.parent_columns,
                })
                .collect();
            foreign_keys.sort();

            CanonicalTable {
                name: &table.name,
                columns,
                primary_key,
                foreign_keys,
            }
        })
        .collect();
    tables.sort_by(|a, b| a.name.cmp(b.name));
    tables
}

fn canonical_access(access: &TableAccess) -> CanonicalTableAccess {
    CanonicalTableAccess {
        reads: access.reads,
        writes: access.writes,
        solo_accesses: access.solo_accesses,
        joined_accesses: access.joined_accesses,
        total_duration_us: micros(access.total_duration_ms),
    }
}

fn strict_input<'a>(
    schema: &'a SchemaGraph,
    analysis: &'a AnalysisResult,
    target: TargetStore,
) -> StrictInput<'a> {
    let mut join_patterns: Vec<CanonicalJoin<'_>> = analysis
        .join_patterns
        .iter()
        .map(|j| CanonicalJoin {
            table_a: &j.table_a,
            table_b: &j.table_b,
            count: j.count,
            total_duration_us: micros(j.total_duration_ms),
        })
        .collect();
    join_patterns.sort_by(|x, y| (x.table_a, x.table_b).cmp(&(y.table_a, y.table_b)));

    let mut relationships: Vec<CanonicalRelationship<'_>> = analysis
        .relationships
        .iter()
        .map(|r| CanonicalRelationship {
            parent_table: &r.key.parent_table,
            child_table: &r.key.child_table,
            constraint: &r.key.constraint,
            co_access_count: r.co_access_count,
            parent_solo_count: r.parent_solo_count,
            child_solo_count: r.child_solo_count,
            parent_write_count: r.parent_write_count,
            parent_read_count: r.parent_read_count,
            child_write_count: r.child_write_count,
            child_read_count: r.child_read_count,
            max_children_observed: r.max_children_observed,
            avg_children_observed_milli: (r.avg_children_observed * 1000.0).round().max(0.0) as u64,
            cardinality_source: r.cardinality_source,
        })
        .collect();
    relationships.sort_by(|x, y| {
        (x.parent_table, x.child_table, x.constraint).cmp(&(
            y.parent_table,
            y.child_table,
            y.constraint,
        ))
    });

    StrictInput {
        mode: "strict",
        target: target.as_str(),
        tables: canonical_tables(schema),
        total_events: analysis.total_events,
        join_patterns,
        relationships,
        table_access: analysis
            .table_access
            .iter()
            .map(|(name, access)| (name.as_str(), canonical_access(access)))
            .collect(),
    }
}

fn relaxed_input<'a>(
    schema: &'a SchemaGraph,
    analysis: &'a AnalysisResult,
    target: TargetStore,
) -> RelaxedInput<'a> {
    let mut join_pairs: Vec<(&str, &str)> = analysis
        .join_patterns
        .iter()
        .map(|j| (j.table_a.as_str(), j.table_b.as_str()))
        .collect();
    join_pairs.sort_unstable();
    join_pairs.dedup();

    // Rank before cutting so a hand-built or reordered list selects the same pairs.
    let mut ranked: Vec<&JoinPattern> = analysis.join_patterns.iter().collect();
    ranked.sort_by(|x, y| compare_rank(x, y));
    let mut hot_join_pairs: Vec<(&str, &str)> = ranked
        .into_iter()
        .take(HOT_JOIN_LIMIT)
        .map(|j| (j.table_a.as_str(), j.table_b.as_str()))
        .collect();
    hot_join_pairs.sort_unstable();

    let write_heavy_tables = analysis
        .table_access
        .iter()
        .filter(|(_, a)| a.write_ratio() > WRITE_HEAVY_RATIO)
        .map(|(name, _)| name.as_str())
        .collect();
    let read_heavy_tables = analysis
        .table_access
        .iter()
        .filter(|(_, a)| a.write_ratio() < READ_HEAVY_RATIO)
        .map(|(name, _)| name.as_str())
        .collect();

    RelaxedInput {
        mode: "relaxed",
        target: target.as_str(),
        tables: canonical_tables(schema),
        join_pairs,
        hot_join_pairs,
        write_heavy_tables,
        read_heavy_tables,
    }
}

/// Fingerprint used as the cache key: SHA-256 of the canonical input,
/// truncated to `len` hex characters.
pub fn fingerprint(
    schema: &SchemaGraph,
    analysis: &AnalysisResult,
    target: TargetStore,
    mode: CacheMode,
    len: usize,
) -> Result<String, serde_json::Error> {
    match mode {
        CacheMode::Strict => canonical::digest_prefix(&strict_input(schema, analysis, target), len),
        CacheMode::Relaxed => {
            canonical::digest_prefix(&relaxed_input(schema, analysis, target), len)
        }
    }
}
