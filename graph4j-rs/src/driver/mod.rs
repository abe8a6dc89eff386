//! Graph database driver abstraction.
//!
//! Defines the [`GraphDriver`] trait every store backend satisfies, the
//! query shape shared by node and fact search, and the compute-if-absent
//! embedding step used by every `bulk_upsert`.
//!
//! # Implementations
//! - [`neo4j::Neo4jDriver`]: Neo4j 5.x over Bolt (`neo4rs`).
//! - [`memory::MemoryDriver`]: in-process store for tests and local runs.

pub mod memory;
pub mod neo4j;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::edges::EntityEdge;
use crate::embedder::EmbedderClient;
use crate::errors::{Graph4jError, Result};
use crate::nodes::{EntityNode, EpisodicNode};
use crate::pipeline::GraphFragment;

/// Rank constant for reciprocal rank fusion inside a single store.
pub const RRF_K: f32 = 60.0;

/// Structural filters applied before ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Restrict to these groups. Empty means every group.
    pub group_ids: Vec<String>,
    /// Node search only: keep nodes carrying at least one of these labels.
    pub node_labels: Vec<String>,
}

/// How a store orders its hybrid candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Reranker {
    /// Reciprocal rank fusion of the keyword and vector lists.
    #[default]
    Rrf,
    /// Order by graph distance from a center node, RRF as tie-break.
    NodeDistance { center: Uuid },
}

/// A hybrid (keyword + vector) query against one store.
#[derive(Debug, Clone)]
pub struct StoreQuery {
    pub keywords: String,
    /// Query vector from the same provider that embedded the store's contents.
    pub vector: Vec<f32>,
    pub filters: SearchFilters,
    pub reranker: Reranker,
    pub limit: usize,
}

/// A graph store backend.
///
/// Object safe, so a binding can hold an `Arc<dyn GraphDriver>`.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Short backend name for logs, e.g. `"neo4j"`.
    fn backend(&self) -> &'static str;

    /// Health check: verify connectivity to the database.
    async fn ping(&self) -> Result<()>;

    /// Release connections.
    async fn close(&self) -> Result<()>;

    /// Create uniqueness constraints and full-text indexes. Idempotent.
    async fn build_indices_and_constraints(&self) -> Result<()>;

    /// Persist a fragment, embedding anything absent with `embedder` first.
    ///
    /// Nodes and edges are upserted by uuid. On return every node and edge of
    /// `fragment` carries an embedding from `embedder` or one it already had,
    /// including when the write itself failed, so a retry does not re-embed.
    async fn bulk_upsert(
        &self,
        fragment: &mut GraphFragment,
        embedder: &dyn EmbedderClient,
    ) -> Result<()>;

    /// Every entity node of `group_id`, used for deduplication at extraction.
    async fn entity_nodes_by_group(&self, group_id: &str) -> Result<Vec<EntityNode>>;

    async fn search_nodes(&self, query: &StoreQuery) -> Result<Vec<EntityNode>>;

    async fn search_edges(&self, query: &StoreQuery) -> Result<Vec<EntityEdge>>;

    async fn get_entity_edge(&self, uuid: Uuid) -> Result<Option<EntityEdge>>;

    /// Returns `false` when no such edge exists.
    async fn delete_entity_edge(&self, uuid: Uuid) -> Result<bool>;

    /// Delete an episode, its mentions, and the facts only it supported.
    /// Returns `false` when no such episode exists.
    async fn delete_episode(&self, uuid: Uuid) -> Result<bool>;

    async fn delete_group(&self, group_id: &str) -> Result<()>;

    /// Remove everything from the store.
    async fn clear(&self) -> Result<()>;

    /// The `last_n` most recent episodes valid at or before `reference_time`,
    /// oldest first.
    async fn retrieve_episodes(
        &self,
        group_ids: &[String],
        last_n: usize,
        reference_time: DateTime<Utc>,
    ) -> Result<Vec<EpisodicNode>>;
}

/// Fill every absent name and fact embedding of `fragment` using `embedder`.
///
/// Present embeddings are never touched. Returns how many vectors were computed.
pub async fn fill_missing_embeddings(
    fragment: &mut GraphFragment,
    embedder: &dyn EmbedderClient,
) -> Result<usize> {
    let node_idx: Vec<usize> = fragment
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.name_embedding.is_none())
        .map(|(i, _)| i)
        .collect();
    let edge_idx: Vec<usize> = fragment
        .edges
        .iter()
        .enumerate()
        .filter(|(_, e)| e.fact_embedding.is_none())
        .map(|(i, _)| i)
        .collect();

    if !node_idx.is_empty() {
        let names: Vec<&str> = node_idx.iter().map(|&i| fragment.nodes[i].name.as_str()).collect();
        let vectors = embedder.embed_batch(&names).await?;
        check_count(names.len(), vectors.len(), embedder)?;
        for (i, v) in node_idx.iter().zip(vectors) {
            fragment.nodes[*i].name_embedding = Some(v);
        }
    }

    if !edge_idx.is_empty() {
        let facts: Vec<&str> = edge_idx.iter().map(|&i| fragment.edges[i].fact.as_str()).collect();
        let vectors = embedder.embed_batch(&facts).await?;
        check_count(facts.len(), vectors.len(), embedder)?;
        for (i, v) in edge_idx.iter().zip(vectors) {
            fragment.edges[*i].fact_embedding = Some(v);
        }
    }

    let filled = node_idx.len() + edge_idx.len();
    if filled > 0 {
        debug!(model = embedder.model(), filled, "computed missing embeddings");
    }
    Ok(filled)
}

fn check_count(expected: usize, got: usize, embedder: &dyn EmbedderClient) -> Result<()> {
    if expected == got {
        return Ok(());
    }
    Err(Graph4jError::Embedder(format!(
        "{} returned {got} embeddings for {expected} inputs",
        embedder.model()
    )))
}

/// Reciprocal-rank-fuse several ranked uuid lists into one ordering.
///
/// Ties are broken by uuid so the output is deterministic.
pub(crate) fn rrf_order(lists: &[Vec<Uuid>]) -> Vec<(Uuid, f32)> {
    let mut scores: std::collections::HashMap<Uuid, f32> = std::collections::HashMap::new();
    for list in lists {
        for (rank, uuid) in list.iter().enumerate() {
            *scores.entry(*uuid).or_default() += 1.0 / (RRF_K + rank as f32 + 1.0);
        }
    }
    let mut scored: Vec<(Uuid, f32)> = scores.into_iter().collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored
}
