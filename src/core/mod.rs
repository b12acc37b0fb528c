//! Shared primitives: input types, errors, configuration, hashing and the
//! SQLite plumbing behind the persistent cache.

pub mod canonical;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod schema_graph;
pub mod schemas;
pub mod time;
