//! Facts: typed, time-bounded relationships between two entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A `RELATES_TO` edge carrying one fact.
///
/// `valid_at`/`invalid_at` bound when the fact held in the world;
/// `created_at`/`expired_at` bound when the edge was live in the store.
/// `fact_embedding` is absent or comes from the provider of the store the
/// edge was written to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEdge {
    pub uuid: Uuid,
    pub source_node_uuid: Uuid,
    pub target_node_uuid: Uuid,
    /// Relation type in upper snake case, e.g. `PREFERS`.
    pub name: String,
    pub fact: String,
    pub fact_embedding: Option<Vec<f32>>,
    pub valid_at: Option<DateTime<Utc>>,
    pub invalid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,
    /// Episodes that asserted this fact.
    pub episodes: Vec<Uuid>,
    pub attributes: serde_json::Value,
    pub group_id: String,
}

impl EntityEdge {
    pub fn new(
        source_node_uuid: Uuid,
        target_node_uuid: Uuid,
        name: impl Into<String>,
        fact: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            source_node_uuid,
            target_node_uuid,
            name: name.into(),
            fact: fact.into(),
            fact_embedding: None,
            valid_at: None,
            invalid_at: None,
            created_at: Utc::now(),
            expired_at: None,
            episodes: Vec::new(),
            attributes: serde_json::Value::Object(Default::default()),
            group_id: group_id.into(),
        }
    }

    /// Whether the fact still holds at `at` in valid time.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_at.map_or(true, |v| v <= at) && self.invalid_at.map_or(true, |i| at < i)
    }

    /// Whether `node` is one of the two endpoints.
    pub fn touches(&self, node: Uuid) -> bool {
        self.source_node_uuid == node || self.target_node_uuid == node
    }
}
