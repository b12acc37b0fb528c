//! Relational schema graph consumed by the engine.
//!
//! The graph is produced by an external DDL collaborator and is read-only for
//! the duration of an analysis run. Each foreign key is a `child -> parent`
//! edge; cycles and self-references are allowed because relationships are
//! evaluated per edge, never by traversal.

use crate::core::error::InputError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKey {
    /// Constraint name; synthesized from the columns when the DDL had none.
    #[serde(default)]
    pub name: String,
    pub columns: Vec<String>,
    pub parent_table: String,
    #[serde(default)]
    pub parent_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_column(mut self, name: &str, data_type: &str) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
        });
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Declares `columns` on this table as referencing `parent_table`.
    pub fn with_foreign_key(mut self, columns: &[&str], parent_table: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            name: String::new(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            parent_table: parent_table.to_string(),
            parent_columns: Vec::new(),
        });
        self
    }
}

/// Identity of one foreign-key edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationshipKey {
    pub parent_table: String,
    pub child_table: String,
    pub constraint: String,
}

impl RelationshipKey {
    pub fn is_self_reference(&self) -> bool {
        self.parent_table == self.child_table
    }
}

impl fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            self.parent_table, self.child_table, self.constraint
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaGraph {
    pub tables: Vec<Table>,
}

impl SchemaGraph {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    /// Checks the structural contract: unique non-empty names and foreign
    /// keys that reference declared tables.
    pub fn validate(&self) -> Result<(), InputError> {
        let mut names = BTreeSet::new();
        for table in &self.tables {
            if table.name.trim().is_empty() {
                return Err(InputError::EmptyTableName);
            }
            if !names.insert(table.name.as_str()) {
                return Err(InputError::DuplicateTable(table.name.clone()));
            }
        }

        for table in &self.tables {
            for fk in &table.foreign_keys {
                let constraint = constraint_name(&table.name, fk);
                if fk.columns.is_empty() {
                    return Err(InputError::EmptyForeignKey {
                        child: table.name.clone(),
                        constraint,
                    });
                }
                if !names.contains(fk.parent_table.as_str()) {
                    return Err(InputError::UnknownParentTable {
                        child: table.name.clone(),
                        parent: fk.parent_table.clone(),
                        constraint,
                    });
                }
            }
        }
        Ok(())
    }

    /// Every foreign-key edge, sorted by key. Callers should `validate` first.
    pub fn relationships(&self) -> Vec<RelationshipKey> {
        let mut keys: Vec<RelationshipKey> = self
            .tables
            .iter()
            .flat_map(|table| {
                table.foreign_keys.iter().map(move |fk| RelationshipKey {
                    parent_table: fk.parent_table.clone(),
                    child_table: table.name.clone(),
                    constraint: constraint_name(&table.name, fk),
                })
            })
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Explicit constraint name, or `child.col1,col2->parent` when unnamed.
pub fn constraint_name(child_table: &str, fk: &ForeignKey) -> String {
    if !fk.name.trim().is_empty() {
        return fk.name.clone();
    }
    format!(
        "{}.{}->{}",
        child_table,
        fk.columns.join(","),
        fk.parent_table
    )
}
