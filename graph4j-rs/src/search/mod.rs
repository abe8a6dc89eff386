//! Search subsystem.
//!
//! [`SearchCoordinator`] routes node and fact queries to one or both store
//! bindings. Each store runs its own hybrid retrieval (keyword + cosine,
//! fused with RRF or reranked by node distance); in `dual` mode the two
//! ranked lists are merged with [`fusion::merge_ranked`].

pub mod fusion;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bindings::{Bindings, StoreBinding};
use crate::driver::{Reranker, SearchFilters, StoreQuery};
use crate::edges::EntityEdge;
use crate::errors::{Graph4jError, Result};
use crate::nodes::EntityNode;
use crate::outcome::BindingFailure;
use crate::types::{BindingName, EmbeddingMode, RetryConfig};

/// Entity node search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSearch {
    pub query: String,
    #[serde(default)]
    pub group_ids: Vec<String>,
    pub max_nodes: usize,
    /// Keep only nodes carrying one of these labels. Empty keeps all.
    #[serde(default)]
    pub entity_types: Vec<String>,
}

/// Fact (entity edge) search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactSearch {
    pub query: String,
    #[serde(default)]
    pub group_ids: Vec<String>,
    pub max_facts: usize,
    /// Rerank by graph distance from this node instead of RRF.
    #[serde(default)]
    pub center_node_uuid: Option<Uuid>,
}

/// Ranked results plus where they came from.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome<T> {
    pub results: Vec<T>,
    pub sources: Vec<BindingName>,
    /// Set when a `dual` query fell back to one store.
    pub degraded: Option<BindingFailure>,
}

impl<T> SearchOutcome<T> {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            sources: Vec::new(),
            degraded: None,
        }
    }
}

/// One query shape the coordinator can route.
#[async_trait]
trait SearchRequest: Sync {
    type Item: Send;

    fn limit(&self) -> usize;

    fn uuid_of(item: &Self::Item) -> Uuid;

    async fn run(&self, binding: &StoreBinding) -> Result<Vec<Self::Item>>;
}

async fn embed_query(binding: &StoreBinding, text: &str) -> Result<Vec<f32>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    binding.embedder.embed(text).await
}

#[async_trait]
impl SearchRequest for NodeSearch {
    type Item = EntityNode;

    fn limit(&self) -> usize {
        self.max_nodes
    }

    fn uuid_of(item: &EntityNode) -> Uuid {
        item.uuid
    }

    async fn run(&self, binding: &StoreBinding) -> Result<Vec<EntityNode>> {
        let query = StoreQuery {
            keywords: self.query.clone(),
            vector: embed_query(binding, &self.query).await?,
            filters: SearchFilters {
                group_ids: self.group_ids.clone(),
                node_labels: self.entity_types.clone(),
            },
            reranker: Reranker::Rrf,
            limit: self.max_nodes,
        };
        binding.driver.search_nodes(&query).await
    }
}

#[async_trait]
impl SearchRequest for FactSearch {
    type Item = EntityEdge;

    fn limit(&self) -> usize {
        self.max_facts
    }

    fn uuid_of(item: &EntityEdge) -> Uuid {
        item.uuid
    }

    async fn run(&self, binding: &StoreBinding) -> Result<Vec<EntityEdge>> {
        let query = StoreQuery {
            keywords: self.query.clone(),
            vector: embed_query(binding, &self.query).await?,
            filters: SearchFilters {
                group_ids: self.group_ids.clone(),
                node_labels: Vec::new(),
            },
            reranker: match self.center_node_uuid {
                Some(center) => Reranker::NodeDistance { center },
                None => Reranker::Rrf,
            },
            limit: self.max_facts,
        };
        binding.driver.search_edges(&query).await
    }
}

/// Routes queries by [`EmbeddingMode`] and merges `dual` results.
pub struct SearchCoordinator {
    bindings: Bindings,
    retry: RetryConfig,
}

impl SearchCoordinator {
    pub fn new(bindings: Bindings) -> Self {
        Self {
            bindings,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn search_nodes(
        &self,
        request: &NodeSearch,
        mode: EmbeddingMode,
    ) -> Result<SearchOutcome<EntityNode>> {
        self.execute(request, mode).await
    }

    pub async fn search_facts(
        &self,
        request: &FactSearch,
        mode: EmbeddingMode,
    ) -> Result<SearchOutcome<EntityEdge>> {
        self.execute(request, mode).await
    }

    async fn execute<R: SearchRequest>(
        &self,
        request: &R,
        mode: EmbeddingMode,
    ) -> Result<SearchOutcome<R::Item>> {
        if request.limit() == 0 {
            return Ok(SearchOutcome::empty());
        }

        let mode = self.bindings.effective_mode(mode);
        if let Some(name) = mode.single_binding() {
            let mut results = self.run_with_retry(request, self.bindings.get(name)).await?;
            results.truncate(request.limit());
            return Ok(SearchOutcome {
                results,
                sources: vec![name],
                degraded: None,
            });
        }

        let (fast, quality) = tokio::join!(
            self.run_with_retry(request, self.bindings.fast()),
            self.run_with_retry(request, self.bindings.quality()),
        );

        match (fast, quality) {
            (Ok(fast), Ok(quality)) => {
                debug!(fast = fast.len(), quality = quality.len(), "merging dual search results");
                Ok(SearchOutcome {
                    results: fusion::merge_ranked(fast, quality, R::uuid_of, request.limit()),
                    sources: vec![BindingName::Fast, BindingName::Quality],
                    degraded: None,
                })
            }
            (Ok(results), Err(e)) => Ok(degraded(results, BindingName::Fast, BindingName::Quality, &e, request.limit())),
            (Err(e), Ok(results)) => Ok(degraded(results, BindingName::Quality, BindingName::Fast, &e, request.limit())),
            (Err(fe), Err(qe)) => {
                let message = format!("fast: {fe}; quality: {qe}");
                if fe.is_transient() && qe.is_transient() {
                    Err(Graph4jError::StoreUnavailable(message))
                } else {
                    Err(Graph4jError::Search(message))
                }
            }
        }
    }

    async fn run_with_retry<R: SearchRequest>(
        &self,
        request: &R,
        binding: &StoreBinding,
    ) -> Result<Vec<R::Item>> {
        let mut policy = self.retry.policy();
        loop {
            match request.run(binding).await {
                Ok(results) => return Ok(results),
                Err(e) => match policy.delay_for(&e) {
                    Some(delay) => {
                        warn!(binding = %binding.name, error = %e, "store query failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }
}

fn degraded<T>(
    mut results: Vec<T>,
    served: BindingName,
    failed: BindingName,
    err: &Graph4jError,
    limit: usize,
) -> SearchOutcome<T> {
    warn!(failed = %failed, error = %err, "dual search degraded to one store");
    results.truncate(limit);
    SearchOutcome {
        results,
        sources: vec![served],
        degraded: Some(BindingFailure::new(failed, err)),
    }
}
