//! Analysis and decision pipeline.
//!
//! `analyze` turns an event stream into join rankings and per-edge
//! relationship statistics; `recommend` turns those into one embed/reference
//! decision per foreign-key edge, backed by the recommendation cache and an
//! optional advisor.

pub mod advisor;
pub mod analysis;
pub mod cache;
pub mod cache_store;
pub mod decision;
pub mod fingerprint;
pub mod join_ranker;
pub mod recommend;
pub mod recommendation;
pub mod relationship_stats;
