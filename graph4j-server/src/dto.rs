//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use graph4j_rs::edges::EntityEdge;
use graph4j_rs::nodes::{EntityNode, EpisodeInput};
use graph4j_rs::{BindingFailure, DualResult, EmbeddingMode, IngestOutcome, PersistResult};

fn default_limit() -> i64 {
    10
}

/// Generic acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
    pub success: bool,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub dual_store: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub service: String,
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AddEpisodesRequest {
    pub group_id: String,
    pub episodes: Vec<EpisodeInput>,
    #[serde(default)]
    pub embedding_mode: EmbeddingMode,
    /// Ingest inline and report per-episode outcomes instead of queueing.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    Success,
    Partial,
    Failed,
}

/// Outcome of one inline-ingested episode.
#[derive(Debug, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub uuid: Option<Uuid>,
    pub status: EpisodeStatus,
    /// Stores that were written.
    pub stores: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BindingFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EpisodeReport {
    pub fn from_outcome(outcome: &IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Single(r) => Self {
                uuid: Some(r.fragment.episode.uuid),
                status: EpisodeStatus::Success,
                stores: vec![r.binding.to_string()],
                failures: Vec::new(),
                error: None,
            },
            IngestOutcome::Dual(d) => Self::from_dual(outcome.episode_uuid(), d),
        }
    }

    fn from_dual(uuid: Option<Uuid>, d: &DualResult<PersistResult>) -> Self {
        let status = match d {
            DualResult::Both { .. } => EpisodeStatus::Success,
            DualResult::Partial { .. } => EpisodeStatus::Partial,
            DualResult::Neither { .. } => EpisodeStatus::Failed,
        };
        let stores = [d.fast(), d.quality()]
            .into_iter()
            .flatten()
            .map(|r| r.binding.to_string())
            .collect();
        Self {
            uuid,
            status,
            stores,
            failures: d.failures().into_iter().cloned().collect(),
            error: None,
        }
    }

    pub fn failed(uuid: Option<Uuid>, err: impl ToString) -> Self {
        Self {
            uuid,
            status: EpisodeStatus::Failed,
            stores: Vec::new(),
            failures: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddEpisodesResponse {
    pub message: String,
    pub success: bool,
    pub episodes: Vec<EpisodeReport>,
}

#[derive(Debug, Deserialize)]
pub struct EpisodesQuery {
    #[serde(default = "default_last_n")]
    pub last_n: usize,
}

fn default_last_n() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NodeSearchRequest {
    pub query: String,
    #[serde(default)]
    pub group_ids: Option<Vec<String>>,
    #[serde(default = "default_limit")]
    pub max_nodes: i64,
    #[serde(default)]
    pub entity_types: Option<Vec<String>>,
    #[serde(default)]
    pub embedding_mode: EmbeddingMode,
}

#[derive(Debug, Deserialize)]
pub struct FactSearchRequest {
    pub query: String,
    #[serde(default)]
    pub group_ids: Option<Vec<String>>,
    #[serde(default = "default_limit")]
    pub max_facts: i64,
    #[serde(default)]
    pub center_node_uuid: Option<Uuid>,
    #[serde(default)]
    pub embedding_mode: EmbeddingMode,
}

/// Legacy `/search` body.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub group_ids: Option<Vec<String>>,
    pub query: String,
    #[serde(default = "default_limit")]
    pub max_facts: i64,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub role_type: Option<String>,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct GetMemoryRequest {
    pub group_id: String,
    #[serde(default = "default_limit")]
    pub max_facts: i64,
    #[serde(default)]
    pub center_node_uuid: Option<Uuid>,
    pub messages: Vec<Message>,
}

/// One line per message: `role_type(role): content`.
pub fn compose_query(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            format!(
                "{}({}): {}\n",
                m.role_type.as_deref().unwrap_or(""),
                m.role.as_deref().unwrap_or(""),
                m.content
            )
        })
        .collect()
}

/// Clamp a client-supplied limit; zero and negatives mean "no results".
pub fn limit(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeResult {
    pub uuid: Uuid,
    pub name: String,
    pub labels: Vec<String>,
    pub summary: String,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl From<&EntityNode> for NodeResult {
    fn from(n: &EntityNode) -> Self {
        Self {
            uuid: n.uuid,
            name: n.name.clone(),
            labels: n.labels.clone(),
            summary: n.summary.clone(),
            group_id: n.group_id.clone(),
            created_at: n.created_at,
            attributes: n.public_attributes(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FactResult {
    pub uuid: Uuid,
    pub name: String,
    pub fact: String,
    pub valid_at: Option<DateTime<Utc>>,
    pub invalid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl From<&EntityEdge> for FactResult {
    fn from(e: &EntityEdge) -> Self {
        Self {
            uuid: e.uuid,
            name: e.name.clone(),
            fact: e.fact.clone(),
            valid_at: e.valid_at,
            invalid_at: e.invalid_at,
            created_at: e.created_at,
            expired_at: e.expired_at,
        }
    }
}

/// Set when a `dual` query was served by one store only.
#[derive(Debug, Serialize, Deserialize)]
pub struct Degraded {
    pub binding: String,
    pub reason: String,
}

impl From<&BindingFailure> for Degraded {
    fn from(f: &BindingFailure) -> Self {
        Self {
            binding: f.binding.to_string(),
            reason: f.reason.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeSearchResponse {
    pub nodes: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degraded>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FactSearchResponse {
    pub facts: Vec<FactResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degraded>,
}
