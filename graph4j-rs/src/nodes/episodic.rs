//! EpisodicNode: represents an ingested data episode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The source type of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeType {
    #[default]
    Message,
    Json,
    Text,
}

impl EpisodeType {
    /// Parse a caller-supplied type name. Unknown names fall back to `Message`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => EpisodeType::Text,
            "json" => EpisodeType::Json,
            _ => EpisodeType::Message,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeType::Message => "message",
            EpisodeType::Json => "json",
            EpisodeType::Text => "text",
        }
    }
}

/// An ingested data episode. Immutable once created; corrections arrive as new episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicNode {
    pub uuid: Uuid,
    pub name: String,
    pub group_id: String,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub source: EpisodeType,
    pub source_description: String,
    pub content: String,
    /// When the episode happened (reference time), distinct from `created_at`.
    pub valid_at: DateTime<Utc>,
    pub entity_edges: Vec<Uuid>,
}

fn default_episode_type() -> String {
    EpisodeType::Message.as_str().to_string()
}

/// A caller-supplied episode, before it becomes an [`EpisodicNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeInput {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    pub content: String,
    /// `"message"` (default), `"text"` or `"json"`.
    #[serde(default = "default_episode_type")]
    pub episode_type: String,
    #[serde(default = "Utc::now")]
    pub reference_time: DateTime<Utc>,
    #[serde(default)]
    pub source_description: Option<String>,
    /// Speaker role (message episodes only).
    #[serde(default)]
    pub role: Option<String>,
    /// Speaker role kind, e.g. `user` or `assistant` (message episodes only).
    #[serde(default)]
    pub role_type: Option<String>,
}

impl EpisodeInput {
    pub fn new(content: impl Into<String>, episode_type: EpisodeType) -> Self {
        Self {
            uuid: None,
            name: None,
            content: content.into(),
            episode_type: episode_type.as_str().to_string(),
            reference_time: Utc::now(),
            source_description: None,
            role: None,
            role_type: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>, role_type: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self.role_type = Some(role_type.into());
        self
    }

    pub fn source(&self) -> EpisodeType {
        EpisodeType::parse_lenient(&self.episode_type)
    }

    /// Body handed to extraction. Messages are rendered as `role(role_type): content`;
    /// text and JSON are passed through.
    pub fn body(&self) -> String {
        match self.source() {
            EpisodeType::Message => format!(
                "{}({}): {}",
                self.role.as_deref().unwrap_or(""),
                self.role_type.as_deref().unwrap_or(""),
                self.content
            ),
            EpisodeType::Text | EpisodeType::Json => self.content.clone(),
        }
    }

    /// Build the episode node for `group_id`.
    pub fn to_episode(&self, group_id: &str) -> EpisodicNode {
        let uuid = self.uuid.unwrap_or_else(Uuid::new_v4);
        let source = self.source();
        EpisodicNode {
            uuid,
            name: self.name.clone().unwrap_or_else(|| uuid.to_string()),
            group_id: group_id.to_string(),
            labels: vec!["Episodic".to_string()],
            created_at: Utc::now(),
            source,
            source_description: self.source_description.clone().unwrap_or_default(),
            content: self.body(),
            valid_at: self.reference_time,
            entity_edges: Vec::new(),
        }
    }
}
