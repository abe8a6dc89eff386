//! Ingestion pipeline.
//!
//! The stages for one episode:
//! 1. **Resolve**: the group's existing entities are read for deduplication.
//!    In `dual` mode an unreadable `fast` store falls back to the `quality`
//!    store, then to no deduplication.
//! 2. **Extract**: the [`Extractor`] turns the episode into a [`GraphFragment`]
//!    (entities, facts, mentions) with every embedding absent.
//! 3. **Branch** (`dual` only): the fragment is deep-cloned, so the two
//!    writes share nothing.
//! 4. **Persist**: each copy is written to its binding's store, which fills
//!    absent embeddings with that binding's provider first. A provider or
//!    store failure is confined to its branch. Transient store failures are
//!    retried with bounded backoff.

pub mod extract;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bindings::{Bindings, StoreBinding};
use crate::edges::{EntityEdge, EpisodicEdge};
use crate::errors::Result;
use crate::nodes::{EntityNode, EpisodeInput, EpisodicNode};
use crate::outcome::DualResult;
use crate::types::{BindingName, EmbeddingMode, RetryConfig};

pub use extract::{Extractor, LlmExtractor};

/// Everything one episode contributes to the graph.
///
/// A plain owned value: `clone()` is a full structural copy sharing nothing
/// with the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphFragment {
    pub episode: EpisodicNode,
    pub nodes: Vec<EntityNode>,
    pub edges: Vec<EntityEdge>,
    pub episodic_edges: Vec<EpisodicEdge>,
}

impl GraphFragment {
    /// Drop every name and fact embedding.
    pub fn clear_embeddings(&mut self) {
        for node in &mut self.nodes {
            node.name_embedding = None;
        }
        for edge in &mut self.edges {
            edge.fact_embedding = None;
        }
    }

    /// Independent copy with every embedding absent.
    pub fn without_embeddings(&self) -> GraphFragment {
        let mut copy = self.clone();
        copy.clear_embeddings();
        copy
    }

    /// Whether every node and edge carries an embedding.
    pub fn is_fully_embedded(&self) -> bool {
        self.nodes.iter().all(|n| n.name_embedding.is_some())
            && self.edges.iter().all(|e| e.fact_embedding.is_some())
    }
}

/// A fragment committed to one binding's store.
#[derive(Debug, Clone)]
pub struct PersistResult {
    pub binding: BindingName,
    /// The fragment as written, embeddings included.
    pub fragment: GraphFragment,
    /// Write attempts made, retries included.
    pub attempts: u32,
}

/// What an ingestion call did.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// `fast` or `default` mode: one store written.
    Single(PersistResult),
    /// `dual` mode: each store's write reported separately.
    Dual(DualResult<PersistResult>),
}

impl IngestOutcome {
    pub fn episode_uuid(&self) -> Option<Uuid> {
        match self {
            IngestOutcome::Single(r) => Some(r.fragment.episode.uuid),
            IngestOutcome::Dual(d) => d
                .quality()
                .or_else(|| d.fast())
                .map(|r| r.fragment.episode.uuid),
        }
    }
}

/// Runs extraction once per episode and persists to one or both bindings.
pub struct IngestionCoordinator {
    bindings: Bindings,
    extractor: Arc<dyn Extractor>,
    retry: RetryConfig,
}

impl IngestionCoordinator {
    pub fn new(bindings: Bindings, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            bindings,
            extractor,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Ingest one caller-supplied episode into `group_id`.
    pub async fn ingest(
        &self,
        input: &EpisodeInput,
        group_id: &str,
        mode: EmbeddingMode,
    ) -> Result<IngestOutcome> {
        self.ingest_episode(input.to_episode(group_id), mode).await
    }

    /// Ingest an already-built episode node.
    ///
    /// Extraction failure returns `Err` before any store is written. In
    /// `dual` mode store and embedding failures are reported inside
    /// [`DualResult`], and nothing on the `fast` side stops the `quality`
    /// write.
    pub async fn ingest_episode(
        &self,
        episode: EpisodicNode,
        mode: EmbeddingMode,
    ) -> Result<IngestOutcome> {
        let mode = self.bindings.effective_mode(mode);

        if let Some(name) = mode.single_binding() {
            let binding = self.bindings.get(name);
            let known = self.known_entities(binding, &episode.group_id).await?;
            let fragment = self.extract(&episode, &known).await?;
            let result = self.persist(binding, fragment).await?;
            info!(
                episode = %episode.uuid,
                group_id = %episode.group_id,
                binding = %name,
                nodes = result.fragment.nodes.len(),
                edges = result.fragment.edges.len(),
                "episode ingested"
            );
            return Ok(IngestOutcome::Single(result));
        }

        let fast = self.bindings.fast();
        let quality = self.bindings.quality();

        let known = self.dual_known_entities(&episode.group_id).await;
        let fragment = self.extract(&episode, &known).await?;
        let copy = fragment.without_embeddings();

        let (fast_result, quality_result) =
            tokio::join!(self.persist(fast, fragment), self.persist(quality, copy));
        let result = DualResult::from_pair(fast_result, quality_result);

        match &result {
            DualResult::Both { .. } => info!(
                episode = %episode.uuid,
                group_id = %episode.group_id,
                "episode ingested into both stores"
            ),
            DualResult::Partial { failure, .. } => warn!(
                episode = %episode.uuid,
                failed = %failure.binding,
                reason = %failure.reason,
                "episode ingested into one store only"
            ),
            DualResult::Neither { fast, quality } => warn!(
                episode = %episode.uuid,
                fast = %fast.reason,
                quality = %quality.reason,
                "episode ingestion failed on both stores"
            ),
        }

        Ok(IngestOutcome::Dual(result))
    }

    /// Run the extractor and drop any vector it attached: each store's write
    /// computes its own.
    async fn extract(&self, episode: &EpisodicNode, known: &[EntityNode]) -> Result<GraphFragment> {
        let mut fragment = self.extractor.extract(episode, known).await?;
        fragment.clear_embeddings();
        Ok(fragment)
    }

    /// Existing entities of `group_id`, without their vectors.
    async fn known_entities(&self, binding: &StoreBinding, group_id: &str) -> Result<Vec<EntityNode>> {
        let mut policy = self.retry.policy();
        loop {
            match binding.driver.entity_nodes_by_group(group_id).await {
                Ok(mut nodes) => {
                    for node in &mut nodes {
                        node.name_embedding = None;
                    }
                    return Ok(nodes);
                }
                Err(e) => match policy.delay_for(&e) {
                    Some(delay) => {
                        warn!(binding = %binding.name, error = %e, "entity read failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    /// Existing entities for a `dual` ingestion: `fast` first, then
    /// `quality`, then none. A store that cannot be read never blocks the
    /// other store's write.
    async fn dual_known_entities(&self, group_id: &str) -> Vec<EntityNode> {
        for binding in [self.bindings.fast(), self.bindings.quality()] {
            match self.known_entities(binding, group_id).await {
                Ok(nodes) => return nodes,
                Err(e) => warn!(binding = %binding.name, error = %e, "cannot read existing entities"),
            }
        }
        warn!(group_id, "extracting without deduplication against stored entities");
        Vec::new()
    }

    /// Write `fragment` to `binding`, retrying transient store failures.
    ///
    /// Embeddings filled by a failed attempt are kept, so a retry only pays
    /// for the write.
    async fn persist(&self, binding: &StoreBinding, mut fragment: GraphFragment) -> Result<PersistResult> {
        let mut policy = self.retry.policy();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match binding.driver.bulk_upsert(&mut fragment, binding.embedder.as_ref()).await {
                Ok(()) => {
                    return Ok(PersistResult {
                        binding: binding.name,
                        fragment,
                        attempts,
                    })
                }
                Err(e) => match policy.delay_for(&e) {
                    Some(delay) => {
                        warn!(
                            binding = %binding.name,
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "store write failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }
}
