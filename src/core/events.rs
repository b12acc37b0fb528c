//! Parsed query events supplied by the log collaborator.

use crate::core::error::InputError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

/// One table touched by a query.
///
/// `row_key` and `parent_refs` are only present when the collaborator could
/// recover row identity (for example from bound parameters). They feed
/// observed cardinality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableTouch {
    pub table: String,
    pub access: AccessKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_key: Option<String>,
    /// Parent reference -> key of the parent row this row belongs to. The
    /// reference is a foreign-key constraint name, or the parent table name
    /// when the table pair has a single foreign key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parent_refs: BTreeMap<String, String>,
}

impl TableTouch {
    pub fn read(table: &str) -> Self {
        Self::new(table, AccessKind::Read)
    }

    pub fn write(table: &str) -> Self {
        Self::new(table, AccessKind::Write)
    }

    pub fn new(table: &str, access: AccessKind) -> Self {
        Self {
            table: table.to_string(),
            access,
            row_key: None,
            parent_refs: BTreeMap::new(),
        }
    }

    /// Attaches row identity: this row `row_key` belongs to the row
    /// `parent_key` reached through `parent` (a table or constraint name).
    pub fn with_row(mut self, row_key: &str, parent: &str, parent_key: &str) -> Self {
        self.row_key = Some(row_key.to_string());
        self.parent_refs
            .insert(parent.to_string(), parent_key.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryEvent {
    pub id: String,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub timestamp_ms: u64,
    #[serde(default)]
    pub duration_ms: f64,
    pub touches: Vec<TableTouch>,
}

impl QueryEvent {
    pub fn new(id: impl Into<String>, duration_ms: f64, touches: Vec<TableTouch>) -> Self {
        Self {
            id: id.into(),
            timestamp_ms: 0,
            duration_ms,
            touches,
        }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if !self.duration_ms.is_finite() || self.duration_ms < 0.0 {
            return Err(InputError::InvalidDuration {
                event_id: self.id.clone(),
                duration_ms: self.duration_ms,
            });
        }
        Ok(())
    }

    /// Distinct touched table names in sorted order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.touches.iter().map(|t| t.table.as_str()).collect();
        tables.sort_unstable();
        tables.dedup();
        tables
    }

    pub fn touches_table(&self, table: &str) -> bool {
        self.touches.iter().any(|t| t.table == table)
    }

    /// Whether `table` is read and/or written by this event. A table that is
    /// both read and written counts once on each side.
    pub fn access_of(&self, table: &str) -> (bool, bool) {
        let mut read = false;
        let mut write = false;
        for touch in self.touches.iter().filter(|t| t.table == table) {
            match touch.access {
                AccessKind::Read => read = true,
                AccessKind::Write => write = true,
            }
        }
        (read, write)
    }
}

pub fn validate_events(events: &[QueryEvent]) -> Result<(), InputError> {
    events.iter().try_for_each(QueryEvent::validate)
}
