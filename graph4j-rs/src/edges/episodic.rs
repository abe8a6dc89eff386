//! `MENTIONS` edges from an episode to the entities it names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structural link only; never embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicEdge {
    pub uuid: Uuid,
    /// The episode.
    pub source_node_uuid: Uuid,
    /// The mentioned entity.
    pub target_node_uuid: Uuid,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
}

impl EpisodicEdge {
    pub fn mentions(episode: Uuid, entity: Uuid, group_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            source_node_uuid: episode,
            target_node_uuid: entity,
            group_id: group_id.into(),
            created_at: Utc::now(),
        }
    }
}
