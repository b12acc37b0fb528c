//! Schema Travels: access-pattern analysis for relational-to-document migration.
//!
//! **Given a relational schema and a stream of observed queries, decide for
//! every foreign-key edge whether the child rows should be embedded in the
//! parent document or kept as a separate collection with a reference.**
//!
//! # Pipeline
//!
//! 1. [`analyze`] ranks co-accessed table pairs and builds per-edge
//!    relationship statistics (co-access, solo access, read/write mix,
//!    observed cardinality).
//! 2. [`recommend`] fingerprints the inputs, consults the recommendation
//!    cache, applies the fixed-priority rule table and, when asked, an
//!    external advisor.
//!
//! # Guarantees
//!
//! - **Coverage**: exactly one recommendation per foreign-key edge.
//! - **Determinism**: identical inputs give byte-identical rule-based output.
//! - **Graceful degradation**: advisor and cache failures never fail a run;
//!   the rule table is always the fallback.
//!
//! # Example
//!
//! ```
//! use schema_travels::core::events::{QueryEvent, TableTouch};
//! use schema_travels::core::schema_graph::{SchemaGraph, Table};
//! use schema_travels::engine::cache::RecommendationCache;
//! use schema_travels::engine::recommend::RecommendOptions;
//! use schema_travels::engine::recommendation::TargetStore;
//!
//! let schema = SchemaGraph::new(vec![
//!     Table::new("orders").with_primary_key(&["id"]),
//!     Table::new("items").with_foreign_key(&["order_id"], "orders"),
//! ]);
//! let events = vec![QueryEvent::new(
//!     "q1",
//!     2.5,
//!     vec![TableTouch::read("orders"), TableTouch::read("items")],
//! )];
//!
//! let analysis = schema_travels::analyze(&events, &schema).unwrap();
//! let cache = RecommendationCache::in_memory();
//! let options = RecommendOptions::default();
//! let set = schema_travels::recommend(
//!     &analysis,
//!     &schema,
//!     TargetStore::MongoDb,
//!     &options,
//!     &cache,
//!     None,
//! )
//! .unwrap();
//! assert_eq!(set.recommendations.len(), 1);
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: input types, errors, configuration, hashing, SQLite plumbing
//! - [`engine`]: ranker, statistics, rule table, cache, advisor bridge

pub mod core;
pub mod engine;

pub use crate::core::error::{AdvisorError, CacheError, EngineError, InputError};
pub use crate::engine::analysis::{AnalysisResult, analyze};
pub use crate::engine::recommend::{RecommendOptions, RecommendationSet, recommend};
