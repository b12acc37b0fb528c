use std::io;
use std::time::Duration;
use thiserror::Error;

/// Malformed caller input. Aborts the run before anything is computed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Table name must not be empty")]
    EmptyTableName,
    #[error("Duplicate table in schema graph: {0}")]
    DuplicateTable(String),
    #[error("Foreign key '{constraint}' on '{child}' references unknown table '{parent}'")]
    UnknownParentTable {
        child: String,
        parent: String,
        constraint: String,
    },
    #[error("Foreign key '{constraint}' on '{child}' has no columns")]
    EmptyForeignKey { child: String, constraint: String },
    #[error("Event '{event_id}' has invalid duration {duration_ms}")]
    InvalidDuration { event_id: String, duration_ms: f64 },
    #[error("Analysis does not match the schema graph: {0}")]
    AnalysisSchemaMismatch(String),
}

/// Advisor failures. Always recovered by falling back to the rule table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdvisorError {
    #[error("Advisor unavailable: {0}")]
    Unavailable(String),
    #[error("Advisor timed out after {0:?}")]
    Timeout(Duration),
    #[error("Advisor transport failure: {0}")]
    Transport(String),
    #[error("Malformed advisor response: {0}")]
    MalformedResponse(String),
    #[error("Advisor response does not cover the schema: {0}")]
    Coverage(String),
}

impl AdvisorError {
    pub fn kind(&self) -> &'static str {
        match self {
            AdvisorError::Unavailable(_) => "unavailable",
            AdvisorError::Timeout(_) => "timeout",
            AdvisorError::Transport(_) => "transport",
            AdvisorError::MalformedResponse(_) => "malformed_response",
            AdvisorError::Coverage(_) => "coverage",
        }
    }
}

/// Cache failures. Reads recover by treating the entry as absent.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Cache SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt cache entry {fingerprint}: {reason}")]
    Corrupt { fingerprint: String, reason: String },
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),
    #[error("Advisor error: {0}")]
    Advisor(#[from] AdvisorError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Fingerprint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// `true` when nothing could be computed. Advisor and cache errors are
    /// degradations the engine recovers from.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Advisor(_) | EngineError::Cache(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Input(_) => "input",
            EngineError::Advisor(_) => "advisor",
            EngineError::Cache(_) => "cache",
            EngineError::Config(_) => "config",
            EngineError::Io(_) => "io",
            EngineError::Serialization(_) => "serialization",
        }
    }
}
