use crate::core::schema_graph::RelationshipKey;
use crate::engine::relationship_stats::CardinalitySource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Child documents nested inside the parent document.
    Embed,
    /// Child kept as a separate document linked by identifier.
    Reference,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Embed => "EMBED",
            Decision::Reference => "REFERENCE",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMBED" => Ok(Decision::Embed),
            "REFERENCE" => Ok(Decision::Reference),
            other => Err(format!("unknown decision '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetStore {
    #[default]
    MongoDb,
    DynamoDb,
}

impl TargetStore {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStore::MongoDb => "mongodb",
            TargetStore::DynamoDb => "dynamodb",
        }
    }
}

impl fmt::Display for TargetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetStore {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(TargetStore::MongoDb),
            "dynamodb" | "dynamo" => Ok(TargetStore::DynamoDb),
            other => Err(format!("unsupported target store '{other}'")),
        }
    }
}

/// Verdict for one foreign-key edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub parent_table: String,
    pub child_table: String,
    /// Constraint identifying the edge; advisors may leave it empty when the
    /// table pair is unambiguous.
    #[serde(default)]
    pub constraint: String,
    pub decision: Decision,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub cardinality_source: CardinalitySource,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl Recommendation {
    pub fn key(&self) -> RelationshipKey {
        RelationshipKey {
            parent_table: self.parent_table.clone(),
            child_table: self.child_table.clone(),
            constraint: self.constraint.clone(),
        }
    }

    pub fn relationship_label(&self) -> String {
        format!("{} -> {}", self.parent_table, self.child_table)
    }
}
