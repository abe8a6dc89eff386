//! In-process graph store.
//!
//! Thread-safe via `DashMap`, nothing is persisted. Hybrid search mirrors the
//! Neo4j driver: a keyword list (token overlap) and a vector list (cosine)
//! fused with RRF, or ordered by BFS distance from a center node.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::driver::{fill_missing_embeddings, rrf_order, GraphDriver, Reranker, StoreQuery};
use crate::edges::{EntityEdge, EpisodicEdge};
use crate::embedder::EmbedderClient;
use crate::errors::Result;
use crate::nodes::{EntityNode, EpisodicNode};
use crate::pipeline::GraphFragment;
use crate::utils::{cosine_similarity, keyword_tokens};

/// Candidates scoring below this cosine are left out of the vector list.
const MIN_SIMILARITY: f32 = 0.0;

#[derive(Default)]
pub struct MemoryDriver {
    episodes: DashMap<Uuid, EpisodicNode>,
    nodes: DashMap<Uuid, EntityNode>,
    edges: DashMap<Uuid, EntityEdge>,
    mentions: DashMap<Uuid, EpisodicEdge>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn episode_count(&self) -> usize {
        self.episodes.len()
    }

    /// Snapshot of a stored node.
    pub fn node(&self, uuid: Uuid) -> Option<EntityNode> {
        self.nodes.get(&uuid).map(|n| n.clone())
    }

    /// Snapshot of every stored node, ordered by uuid.
    pub fn all_nodes(&self) -> Vec<EntityNode> {
        let mut nodes: Vec<EntityNode> = self.nodes.iter().map(|n| n.clone()).collect();
        nodes.sort_by_key(|n| n.uuid);
        nodes
    }

    /// Snapshot of every stored fact, ordered by uuid.
    pub fn all_edges(&self) -> Vec<EntityEdge> {
        let mut edges: Vec<EntityEdge> = self.edges.iter().map(|e| e.clone()).collect();
        edges.sort_by_key(|e| e.uuid);
        edges
    }

    /// Hop distance from `center` to every reachable node, over facts in either direction.
    fn distances_from(&self, center: Uuid) -> HashMap<Uuid, usize> {
        let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for e in self.edges.iter() {
            adjacency.entry(e.source_node_uuid).or_default().push(e.target_node_uuid);
            adjacency.entry(e.target_node_uuid).or_default().push(e.source_node_uuid);
        }

        let mut dist = HashMap::from([(center, 0)]);
        let mut queue = VecDeque::from([center]);
        while let Some(current) = queue.pop_front() {
            let d = dist[&current];
            for next in adjacency.get(&current).into_iter().flatten() {
                if !dist.contains_key(next) {
                    dist.insert(*next, d + 1);
                    queue.push_back(*next);
                }
            }
        }
        dist
    }
}

/// Rank candidates by keyword overlap and by cosine, then fuse or reorder by distance.
///
/// `distance_of` is only consulted for [`Reranker::NodeDistance`].
fn hybrid_rank<T>(
    query: &StoreQuery,
    candidates: Vec<T>,
    uuid_of: impl Fn(&T) -> Uuid,
    text_of: impl Fn(&T) -> String,
    embedding_of: impl Fn(&T) -> Option<&Vec<f32>>,
    distance_of: impl Fn(&T) -> Option<usize>,
) -> Vec<T> {
    let terms = keyword_tokens(&query.keywords);

    let mut keyword: Vec<(Uuid, usize)> = candidates
        .iter()
        .filter_map(|c| {
            let tokens = keyword_tokens(&text_of(c));
            let hits = terms.iter().filter(|t| tokens.contains(t)).count();
            (hits > 0).then(|| (uuid_of(c), hits))
        })
        .collect();
    keyword.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut vector: Vec<(Uuid, f32)> = candidates
        .iter()
        .filter_map(|c| {
            let emb = embedding_of(c)?;
            let score = cosine_similarity(&query.vector, emb);
            (score > MIN_SIMILARITY).then(|| (uuid_of(c), score))
        })
        .collect();
    vector.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let fused = rrf_order(&[
        keyword.into_iter().map(|(u, _)| u).collect(),
        vector.into_iter().map(|(u, _)| u).collect(),
    ]);
    let position: HashMap<Uuid, usize> = fused.iter().enumerate().map(|(i, (u, _))| (*u, i)).collect();

    let mut ranked: Vec<(usize, Option<usize>, T)> = candidates
        .into_iter()
        .filter_map(|c| {
            let pos = *position.get(&uuid_of(&c))?;
            let dist = match query.reranker {
                Reranker::Rrf => None,
                Reranker::NodeDistance { .. } => Some(distance_of(&c).unwrap_or(usize::MAX)),
            };
            Some((pos, dist, c))
        })
        .collect();
    ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(query.limit).map(|(_, _, c)| c).collect()
}

fn in_groups(group_ids: &[String], group_id: &str) -> bool {
    group_ids.is_empty() || group_ids.iter().any(|g| g == group_id)
}

#[async_trait]
impl GraphDriver for MemoryDriver {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn build_indices_and_constraints(&self) -> Result<()> {
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        fragment: &mut GraphFragment,
        embedder: &dyn EmbedderClient,
    ) -> Result<()> {
        fill_missing_embeddings(fragment, embedder).await?;

        self.episodes.insert(fragment.episode.uuid, fragment.episode.clone());
        for node in &fragment.nodes {
            self.nodes.insert(node.uuid, node.clone());
        }
        for edge in &fragment.edges {
            self.edges.insert(edge.uuid, edge.clone());
        }
        for mention in &fragment.episodic_edges {
            self.mentions.insert(mention.uuid, mention.clone());
        }

        debug!(
            episode = %fragment.episode.uuid,
            nodes = fragment.nodes.len(),
            edges = fragment.edges.len(),
            "memory store upsert"
        );
        Ok(())
    }

    async fn entity_nodes_by_group(&self, group_id: &str) -> Result<Vec<EntityNode>> {
        let mut nodes: Vec<EntityNode> = self
            .nodes
            .iter()
            .filter(|n| n.group_id == group_id)
            .map(|n| n.clone())
            .collect();
        nodes.sort_by_key(|n| n.created_at);
        Ok(nodes)
    }

    async fn search_nodes(&self, query: &StoreQuery) -> Result<Vec<EntityNode>> {
        let candidates: Vec<EntityNode> = self
            .nodes
            .iter()
            .filter(|n| in_groups(&query.filters.group_ids, &n.group_id))
            .filter(|n| n.has_any_label(&query.filters.node_labels))
            .map(|n| n.clone())
            .collect();

        let dist = match query.reranker {
            Reranker::NodeDistance { center } => self.distances_from(center),
            Reranker::Rrf => HashMap::new(),
        };

        Ok(hybrid_rank(
            query,
            candidates,
            |n| n.uuid,
            |n| format!("{} {}", n.name, n.summary),
            |n| n.name_embedding.as_ref(),
            |n| dist.get(&n.uuid).copied(),
        ))
    }

    async fn search_edges(&self, query: &StoreQuery) -> Result<Vec<EntityEdge>> {
        let candidates: Vec<EntityEdge> = self
            .edges
            .iter()
            .filter(|e| in_groups(&query.filters.group_ids, &e.group_id))
            .map(|e| e.clone())
            .collect();

        let dist = match query.reranker {
            Reranker::NodeDistance { center } => self.distances_from(center),
            Reranker::Rrf => HashMap::new(),
        };

        Ok(hybrid_rank(
            query,
            candidates,
            |e| e.uuid,
            |e| format!("{} {}", e.name, e.fact),
            |e| e.fact_embedding.as_ref(),
            |e| {
                let s = dist.get(&e.source_node_uuid).copied();
                let t = dist.get(&e.target_node_uuid).copied();
                s.into_iter().chain(t).min()
            },
        ))
    }

    async fn get_entity_edge(&self, uuid: Uuid) -> Result<Option<EntityEdge>> {
        Ok(self.edges.get(&uuid).map(|e| e.clone()))
    }

    async fn delete_entity_edge(&self, uuid: Uuid) -> Result<bool> {
        Ok(self.edges.remove(&uuid).is_some())
    }

    async fn delete_episode(&self, uuid: Uuid) -> Result<bool> {
        if self.episodes.remove(&uuid).is_none() {
            return Ok(false);
        }

        let dropped: Vec<EpisodicEdge> = self
            .mentions
            .iter()
            .filter(|m| m.source_node_uuid == uuid)
            .map(|m| m.clone())
            .collect();
        for m in &dropped {
            self.mentions.remove(&m.uuid);
        }

        // Entities nobody else mentions go with the episode.
        let still_mentioned: HashSet<Uuid> = self.mentions.iter().map(|m| m.target_node_uuid).collect();
        let orphans: HashSet<Uuid> = dropped
            .iter()
            .map(|m| m.target_node_uuid)
            .filter(|n| !still_mentioned.contains(n))
            .collect();
        for n in &orphans {
            self.nodes.remove(n);
        }

        let edge_ids: Vec<Uuid> = self.edges.iter().map(|e| e.uuid).collect();
        for id in edge_ids {
            let remove = match self.edges.get_mut(&id) {
                Some(mut edge) => {
                    let before = edge.episodes.len();
                    edge.episodes.retain(|e| *e != uuid);
                    (before > 0 && edge.episodes.is_empty())
                        || orphans.contains(&edge.source_node_uuid)
                        || orphans.contains(&edge.target_node_uuid)
                }
                None => false,
            };
            if remove {
                self.edges.remove(&id);
            }
        }
        Ok(true)
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        self.episodes.retain(|_, e| e.group_id != group_id);
        self.nodes.retain(|_, n| n.group_id != group_id);
        self.edges.retain(|_, e| e.group_id != group_id);
        self.mentions.retain(|_, m| m.group_id != group_id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.episodes.clear();
        self.nodes.clear();
        self.edges.clear();
        self.mentions.clear();
        Ok(())
    }

    async fn retrieve_episodes(
        &self,
        group_ids: &[String],
        last_n: usize,
        reference_time: DateTime<Utc>,
    ) -> Result<Vec<EpisodicNode>> {
        let mut episodes: Vec<EpisodicNode> = self
            .episodes
            .iter()
            .filter(|e| in_groups(group_ids, &e.group_id) && e.valid_at <= reference_time)
            .map(|e| e.clone())
            .collect();
        episodes.sort_by(|a, b| b.valid_at.cmp(&a.valid_at).then_with(|| a.uuid.cmp(&b.uuid)));
        episodes.truncate(last_n);
        episodes.reverse();
        Ok(episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SearchFilters;
    use crate::embedder::hash::HashEmbedder;
    use crate::nodes::{EpisodeInput, EpisodeType};
    use chrono::Duration;

    /// Episode with `names` as entities chained by `LINKS` facts.
    fn chain_fragment(group: &str, names: &[&str]) -> GraphFragment {
        let episode = EpisodeInput::new(names.join(" "), EpisodeType::Text).to_episode(group);
        let nodes: Vec<EntityNode> = names.iter().map(|n| EntityNode::new(*n, group)).collect();
        let edges: Vec<EntityEdge> = nodes
            .windows(2)
            .map(|w| {
                let mut e = EntityEdge::new(
                    w[0].uuid,
                    w[1].uuid,
                    "LINKS",
                    format!("{} links to {}", w[0].name, w[1].name),
                    group,
                );
                e.episodes.push(episode.uuid);
                e
            })
            .collect();
        let episodic_edges = nodes
            .iter()
            .map(|n| EpisodicEdge::mentions(episode.uuid, n.uuid, group))
            .collect();
        GraphFragment {
            episode,
            nodes,
            edges,
            episodic_edges,
        }
    }

    async fn query(embedder: &HashEmbedder, text: &str, limit: usize) -> StoreQuery {
        StoreQuery {
            keywords: text.to_string(),
            vector: embedder.embed(text).await.unwrap(),
            filters: SearchFilters::default(),
            reranker: Reranker::Rrf,
            limit,
        }
    }

    #[tokio::test]
    async fn upsert_fills_embeddings_and_stores() {
        let driver = MemoryDriver::new();
        let embedder = HashEmbedder::new("e", 1, 16);
        let mut frag = chain_fragment("g", &["Alice", "Coffee"]);

        driver.bulk_upsert(&mut frag, &embedder).await.unwrap();

        assert!(frag.nodes.iter().all(|n| n.name_embedding.is_some()));
        assert_eq!(driver.node_count(), 2);
        assert_eq!(driver.edge_count(), 1);
        assert_eq!(driver.episode_count(), 1);
        assert_eq!(driver.node(frag.nodes[0].uuid), Some(frag.nodes[0].clone()));
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_uuid() {
        let driver = MemoryDriver::new();
        let embedder = HashEmbedder::new("e", 1, 16);
        let mut frag = chain_fragment("g", &["Alice", "Coffee"]);
        driver.bulk_upsert(&mut frag, &embedder).await.unwrap();
        driver.bulk_upsert(&mut frag, &embedder).await.unwrap();
        assert_eq!(driver.node_count(), 2);
    }

    #[tokio::test]
    async fn search_nodes_ranks_matches_and_filters() {
        let driver = MemoryDriver::new();
        let embedder = HashEmbedder::new("e", 1, 64);
        let mut frag = chain_fragment("g", &["dark roast coffee", "bicycle"]);
        frag.nodes[0].add_label("Preference");
        driver.bulk_upsert(&mut frag, &embedder).await.unwrap();
        let mut other = chain_fragment("other", &["coffee grinder"]);
        driver.bulk_upsert(&mut other, &embedder).await.unwrap();

        let mut q = query(&embedder, "coffee", 10).await;
        q.filters.group_ids = vec!["g".into()];
        let hits = driver.search_nodes(&q).await.unwrap();
        assert_eq!(hits[0].name, "dark roast coffee");
        assert!(hits.iter().all(|n| n.group_id == "g"));

        q.filters.node_labels = vec!["Preference".into()];
        let hits = driver.search_nodes(&q).await.unwrap();
        assert_eq!(hits.len(), 1);

        q.filters.node_labels = vec!["Location".into()];
        assert!(driver.search_nodes(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_is_deterministic_and_limited() {
        let driver = MemoryDriver::new();
        let embedder = HashEmbedder::new("e", 1, 64);
        let mut frag = chain_fragment("g", &["coffee a", "coffee b", "coffee c", "coffee d"]);
        driver.bulk_upsert(&mut frag, &embedder).await.unwrap();

        let q = query(&embedder, "coffee", 2).await;
        let first = driver.search_nodes(&q).await.unwrap();
        let second = driver.search_nodes(&q).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn node_distance_puts_near_facts_first() {
        let driver = MemoryDriver::new();
        let embedder = HashEmbedder::new("e", 1, 64);
        let mut frag = chain_fragment("g", &["a", "b", "c", "d"]);
        driver.bulk_upsert(&mut frag, &embedder).await.unwrap();
        let d = frag.nodes[3].uuid;

        let mut q = query(&embedder, "links", 10).await;
        q.reranker = Reranker::NodeDistance { center: d };
        let facts = driver.search_edges(&q).await.unwrap();
        assert_eq!(facts.len(), 3);
        assert_eq!(facts[0].fact, "c links to d");
        assert_eq!(facts[2].fact, "a links to b");
    }

    #[tokio::test]
    async fn delete_episode_removes_its_only_facts_and_orphans() {
        let driver = MemoryDriver::new();
        let embedder = HashEmbedder::new("e", 1, 16);
        let mut frag = chain_fragment("g", &["Alice", "Coffee"]);
        driver.bulk_upsert(&mut frag, &embedder).await.unwrap();

        assert!(driver.delete_episode(frag.episode.uuid).await.unwrap());
        assert_eq!(driver.edge_count(), 0);
        assert_eq!(driver.node_count(), 0);
        assert!(!driver.delete_episode(frag.episode.uuid).await.unwrap());
    }

    #[tokio::test]
    async fn delete_group_and_clear() {
        let driver = MemoryDriver::new();
        let embedder = HashEmbedder::new("e", 1, 16);
        let mut a = chain_fragment("a", &["x", "y"]);
        let mut b = chain_fragment("b", &["z"]);
        driver.bulk_upsert(&mut a, &embedder).await.unwrap();
        driver.bulk_upsert(&mut b, &embedder).await.unwrap();

        driver.delete_group("a").await.unwrap();
        assert_eq!(driver.node_count(), 1);
        assert_eq!(driver.entity_nodes_by_group("a").await.unwrap().len(), 0);

        driver.clear().await.unwrap();
        assert_eq!(driver.episode_count(), 0);
    }

    #[tokio::test]
    async fn get_and_delete_entity_edge() {
        let driver = MemoryDriver::new();
        let embedder = HashEmbedder::new("e", 1, 16);
        let mut frag = chain_fragment("g", &["x", "y"]);
        driver.bulk_upsert(&mut frag, &embedder).await.unwrap();
        let id = frag.edges[0].uuid;

        assert_eq!(driver.get_entity_edge(id).await.unwrap(), Some(frag.edges[0].clone()));
        assert!(driver.delete_entity_edge(id).await.unwrap());
        assert!(!driver.delete_entity_edge(id).await.unwrap());
        assert!(driver.get_entity_edge(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retrieve_episodes_respects_reference_time() {
        let driver = MemoryDriver::new();
        let embedder = HashEmbedder::new("e", 1, 16);
        let now = Utc::now();
        for offset in [3, 2, 1] {
            let mut frag = chain_fragment("g", &["x"]);
            frag.episode.valid_at = now - Duration::hours(offset);
            driver.bulk_upsert(&mut frag, &embedder).await.unwrap();
        }

        let recent = driver.retrieve_episodes(&["g".into()], 2, now).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].valid_at < recent[1].valid_at);
        assert_eq!(recent[1].valid_at, now - Duration::hours(1));

        let earlier = driver
            .retrieve_episodes(&[], 10, now - Duration::minutes(150))
            .await
            .unwrap();
        assert_eq!(earlier.len(), 1);
    }
}
