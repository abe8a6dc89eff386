//! EntityNode: a deduplicated concept extracted from one or more episodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::normalize_whitespace;

/// A real-world entity (person, preference, place, concept) extracted from episodes.
///
/// `name_embedding` is either absent or produced by exactly one embedding
/// provider; drivers fill it lazily when it is absent at persistence time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub uuid: Uuid,
    pub name: String,
    pub group_id: String,
    pub labels: Vec<String>,
    pub summary: String,
    pub name_embedding: Option<Vec<f32>>,
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl EntityNode {
    /// New node with the base `Entity` label and no embedding.
    pub fn new(name: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            group_id: group_id.into(),
            labels: vec!["Entity".to_string()],
            summary: String::new(),
            name_embedding: None,
            attributes: serde_json::Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    /// Add `label` unless already present.
    pub fn add_label(&mut self, label: &str) {
        if !label.is_empty() && !self.labels.iter().any(|l| l == label) {
            self.labels.push(label.to_string());
        }
    }

    /// Key used to recognise two mentions of the same entity within a group.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// Whether any of this node's labels appears in `allowed`.
    /// An empty `allowed` slice matches every node.
    pub fn has_any_label(&self, allowed: &[String]) -> bool {
        allowed.is_empty() || self.labels.iter().any(|l| allowed.contains(l))
    }

    /// Attributes with any key mentioning an embedding removed.
    pub fn public_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        match &self.attributes {
            serde_json::Value::Object(map) => map
                .iter()
                .filter(|(k, _)| !k.to_lowercase().contains("embedding"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => serde_json::Map::new(),
        }
    }
}

/// Whitespace-collapsed, lowercased entity name.
pub fn normalize_name(name: &str) -> String {
    normalize_whitespace(name).to_lowercase()
}
