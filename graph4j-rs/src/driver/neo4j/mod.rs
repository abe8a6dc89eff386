//! Neo4j graph driver implementation.
//!
//! Uses `neo4rs` 0.8 for async, pooled Bolt connections. Entities are
//! `(:Entity)` nodes, facts are `[:RELATES_TO]` relationships between them,
//! episodes are `(:Episodic)` nodes linked to entities by `[:MENTIONS]`.
//!
//! Hybrid search runs a full-text query and a cosine query
//! (`vector.similarity.cosine`, Neo4j 5.18+) and fuses them with RRF, or
//! reorders them by shortest-path distance from a center node.

mod queries;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Query, Row};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::driver::{fill_missing_embeddings, rrf_order, GraphDriver, Reranker, StoreQuery};
use crate::edges::EntityEdge;
use crate::embedder::EmbedderClient;
use crate::errors::{Graph4jError, Result};
use crate::nodes::{EntityNode, EpisodeType, EpisodicNode};
use crate::pipeline::GraphFragment;
use crate::utils::{format_neo4j_datetime, lucene_sanitize, parse_flexible_datetime};

/// Candidates fetched per retrieval method before fusion, relative to the limit.
const CANDIDATE_FACTOR: usize = 3;
const MIN_CANDIDATES: usize = 20;

/// Vector candidates below this cosine are ignored.
const MIN_SIMILARITY: f64 = 0.0;

pub struct Neo4jDriver {
    graph: Graph,
    uri: String,
}

impl Neo4jDriver {
    /// Connect to `uri` (e.g. `bolt://localhost:7687`).
    pub async fn new(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password).await.map_err(store_error)?;
        info!(uri, "connected to neo4j");
        Ok(Self {
            graph,
            uri: uri.to_string(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    async fn fetch(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.graph.execute(q).await.map_err(store_error)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(store_error)? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_uuids(&self, q: Query) -> Result<Vec<Uuid>> {
        self.fetch(q)
            .await?
            .iter()
            .map(|row| parse_uuid(&col::<String>(row, "uuid")?))
            .collect()
    }

    async fn run_in_txn(&self, queries: Vec<Query>) -> Result<()> {
        let mut txn = self.graph.start_txn().await.map_err(store_error)?;
        txn.run_queries(queries).await.map_err(store_error)?;
        txn.commit().await.map_err(store_error)
    }

    /// Keyword and vector candidate lists for `query`, best first.
    async fn candidates(&self, query: &StoreQuery, keyword_q: &str, vector_q: &str) -> Result<Vec<Vec<Uuid>>> {
        let pool = (query.limit * CANDIDATE_FACTOR).max(MIN_CANDIDATES) as i64;
        let mut lists = Vec::with_capacity(2);

        let keywords = lucene_sanitize(query.keywords.trim());
        if !keywords.is_empty() {
            let q = neo4rs::query(keyword_q)
                .param("keywords", keywords)
                .param("limit", pool)
                .param("group_ids", query.filters.group_ids.clone())
                .param("labels", query.filters.node_labels.clone());
            lists.push(self.fetch_uuids(q).await?);
        }

        if !query.vector.is_empty() {
            let vector: Vec<f64> = query.vector.iter().map(|v| f64::from(*v)).collect();
            let q = neo4rs::query(vector_q)
                .param("vector", vector)
                .param("min_score", MIN_SIMILARITY)
                .param("limit", pool)
                .param("group_ids", query.filters.group_ids.clone())
                .param("labels", query.filters.node_labels.clone());
            lists.push(self.fetch_uuids(q).await?);
        }

        Ok(lists)
    }

    async fn distances(&self, center: Uuid, candidates: &[Uuid]) -> Result<HashMap<Uuid, usize>> {
        let q = query(queries::NODE_DISTANCES)
            .param("center", center.to_string())
            .param("uuids", candidates.iter().map(Uuid::to_string).collect::<Vec<_>>());

        let mut out = HashMap::from([(center, 0)]);
        for row in self.fetch(q).await? {
            if let Some(d) = col::<Option<i64>>(&row, "distance")? {
                out.insert(parse_uuid(&col::<String>(&row, "uuid")?)?, d as usize);
            }
        }
        Ok(out)
    }
}

/// Order `fused` uuids by distance from the center (unreachable last), RRF as tie-break.
fn order_by_distance(fused: Vec<Uuid>, distance_of: impl Fn(&Uuid) -> Option<usize>) -> Vec<Uuid> {
    let mut ranked: Vec<(usize, usize, Uuid)> = fused
        .into_iter()
        .enumerate()
        .map(|(pos, u)| (distance_of(&u).unwrap_or(usize::MAX), pos, u))
        .collect();
    ranked.sort();
    ranked.into_iter().map(|(_, _, u)| u).collect()
}

/// Reorder `items` to follow `order`, dropping anything not in it.
fn in_order<T>(order: &[Uuid], items: Vec<T>, uuid_of: impl Fn(&T) -> Uuid) -> Vec<T> {
    let mut by_id: HashMap<Uuid, T> = items.into_iter().map(|i| (uuid_of(&i), i)).collect();
    order.iter().filter_map(|u| by_id.remove(u)).collect()
}

/// Map a driver error to the store taxonomy.
///
/// `Neo.ClientError.*` means Neo4j rejected the statement or data; anything
/// else (I/O, pool, routing, transient server errors) counts as unavailable.
fn store_error(err: neo4rs::Error) -> Graph4jError {
    classify_store_message(err.to_string())
}

fn classify_store_message(msg: String) -> Graph4jError {
    if msg.contains("Neo.ClientError") {
        Graph4jError::StoreConstraint(msg)
    } else {
        Graph4jError::StoreUnavailable(msg)
    }
}

fn col<'r, T: Deserialize<'r>>(row: &'r Row, key: &str) -> Result<T> {
    row.get::<T>(key)
        .map_err(|e| Graph4jError::Validation(format!("neo4j column '{key}': {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Graph4jError::Validation(format!("invalid uuid '{s}': {e}")))
}

fn required_datetime(row: &Row, key: &str) -> Result<DateTime<Utc>> {
    let raw: String = col(row, key)?;
    parse_flexible_datetime(&raw)
        .ok_or_else(|| Graph4jError::Validation(format!("neo4j column '{key}': bad datetime '{raw}'")))
}

fn optional_datetime(row: &Row, key: &str) -> Result<Option<DateTime<Utc>>> {
    Ok(col::<Option<String>>(row, key)?.as_deref().and_then(parse_flexible_datetime))
}

fn embedding(row: &Row, key: &str) -> Result<Option<Vec<f32>>> {
    Ok(col::<Option<Vec<f64>>>(row, key)?
        .filter(|v| !v.is_empty())
        .map(|v| v.into_iter().map(|x| x as f32).collect()))
}

fn attributes(row: &Row) -> Result<serde_json::Value> {
    let raw: String = col(row, "attributes")?;
    Ok(serde_json::from_str(&raw)?)
}

fn datetime_param(dt: Option<&DateTime<Utc>>) -> String {
    dt.map(format_neo4j_datetime).unwrap_or_default()
}

fn node_from_row(row: &Row) -> Result<EntityNode> {
    Ok(EntityNode {
        uuid: parse_uuid(&col::<String>(row, "uuid")?)?,
        name: col(row, "name")?,
        group_id: col(row, "group_id")?,
        labels: col(row, "labels")?,
        summary: col(row, "summary")?,
        name_embedding: embedding(row, "name_embedding")?,
        attributes: attributes(row)?,
        created_at: required_datetime(row, "created_at")?,
    })
}

fn edge_from_row(row: &Row) -> Result<EntityEdge> {
    Ok(EntityEdge {
        uuid: parse_uuid(&col::<String>(row, "uuid")?)?,
        source_node_uuid: parse_uuid(&col::<String>(row, "source_node_uuid")?)?,
        target_node_uuid: parse_uuid(&col::<String>(row, "target_node_uuid")?)?,
        name: col(row, "name")?,
        fact: col(row, "fact")?,
        fact_embedding: embedding(row, "fact_embedding")?,
        valid_at: optional_datetime(row, "valid_at")?,
        invalid_at: optional_datetime(row, "invalid_at")?,
        created_at: required_datetime(row, "created_at")?,
        expired_at: optional_datetime(row, "expired_at")?,
        episodes: col::<Vec<String>>(row, "episodes")?
            .iter()
            .map(|s| parse_uuid(s))
            .collect::<Result<_>>()?,
        attributes: attributes(row)?,
        group_id: col(row, "group_id")?,
    })
}

fn episode_from_row(row: &Row) -> Result<EpisodicNode> {
    Ok(EpisodicNode {
        uuid: parse_uuid(&col::<String>(row, "uuid")?)?,
        name: col(row, "name")?,
        group_id: col(row, "group_id")?,
        labels: vec!["Episodic".to_string()],
        created_at: required_datetime(row, "created_at")?,
        source: EpisodeType::parse_lenient(&col::<String>(row, "source")?),
        source_description: col(row, "source_description")?,
        content: col(row, "content")?,
        valid_at: required_datetime(row, "valid_at")?,
        entity_edges: col::<Vec<String>>(row, "entity_edges")?
            .iter()
            .map(|s| parse_uuid(s))
            .collect::<Result<_>>()?,
    })
}

fn uuid_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

fn embedding_param(v: &Option<Vec<f32>>) -> Vec<f64> {
    v.as_deref()
        .unwrap_or_default()
        .iter()
        .map(|x| f64::from(*x))
        .collect()
}

/// Statements writing `fragment` in dependency order: episode, entities, facts, mentions.
fn upsert_queries(fragment: &GraphFragment) -> Result<Vec<Query>> {
    let ep = &fragment.episode;
    let mut out = vec![query(queries::UPSERT_EPISODE)
        .param("uuid", ep.uuid.to_string())
        .param("name", ep.name.clone())
        .param("group_id", ep.group_id.clone())
        .param("source", ep.source.as_str())
        .param("source_description", ep.source_description.clone())
        .param("content", ep.content.clone())
        .param("entity_edges", uuid_strings(&ep.entity_edges))
        .param("created_at", format_neo4j_datetime(&ep.created_at))
        .param("valid_at", format_neo4j_datetime(&ep.valid_at))];

    for n in &fragment.nodes {
        out.push(
            query(queries::UPSERT_NODE)
                .param("uuid", n.uuid.to_string())
                .param("name", n.name.clone())
                .param("group_id", n.group_id.clone())
                .param("labels", n.labels.clone())
                .param("summary", n.summary.clone())
                .param("name_embedding", embedding_param(&n.name_embedding))
                .param("attributes", serde_json::to_string(&n.attributes)?)
                .param("created_at", format_neo4j_datetime(&n.created_at)),
        );
    }

    let edge_stmt = queries::upsert_edge();
    for e in &fragment.edges {
        out.push(
            query(&edge_stmt)
                .param("uuid", e.uuid.to_string())
                .param("source_uuid", e.source_node_uuid.to_string())
                .param("target_uuid", e.target_node_uuid.to_string())
                .param("name", e.name.clone())
                .param("fact", e.fact.clone())
                .param("fact_embedding", embedding_param(&e.fact_embedding))
                .param("group_id", e.group_id.clone())
                .param("episodes", uuid_strings(&e.episodes))
                .param("attributes", serde_json::to_string(&e.attributes)?)
                .param("created_at", format_neo4j_datetime(&e.created_at))
                .param("valid_at", datetime_param(e.valid_at.as_ref()))
                .param("invalid_at", datetime_param(e.invalid_at.as_ref()))
                .param("expired_at", datetime_param(e.expired_at.as_ref())),
        );
    }

    for m in &fragment.episodic_edges {
        out.push(
            query(queries::UPSERT_MENTION)
                .param("uuid", m.uuid.to_string())
                .param("episode_uuid", m.source_node_uuid.to_string())
                .param("entity_uuid", m.target_node_uuid.to_string())
                .param("group_id", m.group_id.clone())
                .param("created_at", format_neo4j_datetime(&m.created_at)),
        );
    }

    Ok(out)
}

#[async_trait]
impl GraphDriver for Neo4jDriver {
    fn backend(&self) -> &'static str {
        "neo4j"
    }

    async fn ping(&self) -> Result<()> {
        self.graph.run(query("RETURN 1")).await.map_err(store_error)
    }

    async fn close(&self) -> Result<()> {
        // neo4rs releases pooled connections on drop.
        debug!(uri = %self.uri, "closing neo4j driver");
        Ok(())
    }

    async fn build_indices_and_constraints(&self) -> Result<()> {
        for stmt in queries::INDEX_STATEMENTS {
            self.graph.run(query(stmt)).await.map_err(store_error)?;
        }
        info!(uri = %self.uri, "neo4j indices and constraints ready");
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        fragment: &mut GraphFragment,
        embedder: &dyn EmbedderClient,
    ) -> Result<()> {
        fill_missing_embeddings(fragment, embedder).await?;
        let statements = upsert_queries(fragment)?;
        let count = statements.len();
        self.run_in_txn(statements).await?;
        debug!(uri = %self.uri, episode = %fragment.episode.uuid, statements = count, "neo4j upsert committed");
        Ok(())
    }

    async fn entity_nodes_by_group(&self, group_id: &str) -> Result<Vec<EntityNode>> {
        let q = query(&format!("{}{} ORDER BY created_at", queries::NODES_BY_GROUP, queries::NODE_RETURN))
            .param("group_id", group_id);
        self.fetch(q).await?.iter().map(node_from_row).collect()
    }

    async fn search_nodes(&self, query_: &StoreQuery) -> Result<Vec<EntityNode>> {
        let lists = self
            .candidates(query_, queries::NODE_FULLTEXT, queries::NODE_VECTOR)
            .await?;
        let mut order: Vec<Uuid> = rrf_order(&lists).into_iter().map(|(u, _)| u).collect();
        if order.is_empty() {
            return Ok(Vec::new());
        }

        if let Reranker::NodeDistance { center } = query_.reranker {
            let dist = self.distances(center, &order).await?;
            order = order_by_distance(order, |u| dist.get(u).copied());
        }
        order.truncate(query_.limit);

        let q = query(&format!("{}{}", queries::NODES_BY_UUIDS, queries::NODE_RETURN))
            .param("uuids", uuid_strings(&order));
        let nodes = self
            .fetch(q)
            .await?
            .iter()
            .map(node_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(in_order(&order, nodes, |n| n.uuid))
    }

    async fn search_edges(&self, query_: &StoreQuery) -> Result<Vec<EntityEdge>> {
        let lists = self
            .candidates(query_, queries::EDGE_FULLTEXT, queries::EDGE_VECTOR)
            .await?;
        let fused: Vec<Uuid> = rrf_order(&lists).into_iter().map(|(u, _)| u).collect();
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let q = query(&format!("{}{}", queries::EDGES_BY_UUIDS, queries::EDGE_RETURN))
            .param("uuids", uuid_strings(&fused));
        let edges = self
            .fetch(q)
            .await?
            .iter()
            .map(edge_from_row)
            .collect::<Result<Vec<_>>>()?;

        let mut order = fused;
        if let Reranker::NodeDistance { center } = query_.reranker {
            let mut endpoints: Vec<Uuid> = edges
                .iter()
                .flat_map(|e| [e.source_node_uuid, e.target_node_uuid])
                .collect();
            endpoints.sort();
            endpoints.dedup();
            let dist = self.distances(center, &endpoints).await?;
            let edge_dist: HashMap<Uuid, usize> = edges
                .iter()
                .filter_map(|e| {
                    let s = dist.get(&e.source_node_uuid).copied();
                    let t = dist.get(&e.target_node_uuid).copied();
                    s.into_iter().chain(t).min().map(|d| (e.uuid, d))
                })
                .collect();
            order = order_by_distance(order, |u| edge_dist.get(u).copied());
        }
        order.truncate(query_.limit);

        Ok(in_order(&order, edges, |e| e.uuid))
    }

    async fn get_entity_edge(&self, uuid: Uuid) -> Result<Option<EntityEdge>> {
        let q = query(&format!("{}{}", queries::EDGES_BY_UUIDS, queries::EDGE_RETURN))
            .param("uuids", vec![uuid.to_string()]);
        self.fetch(q).await?.first().map(edge_from_row).transpose()
    }

    async fn delete_entity_edge(&self, uuid: Uuid) -> Result<bool> {
        let q = query(queries::DELETE_EDGE).param("uuid", uuid.to_string());
        Ok(!self.fetch(q).await?.is_empty())
    }

    async fn delete_episode(&self, uuid: Uuid) -> Result<bool> {
        let id = uuid.to_string();
        let exists = self
            .fetch(query(queries::EPISODE_EXISTS).param("uuid", id.clone()))
            .await?;
        if exists.is_empty() {
            return Ok(false);
        }

        let steps = queries::DELETE_EPISODE_STEPS
            .iter()
            .map(|stmt| query(stmt).param("uuid", id.clone()))
            .collect();
        self.run_in_txn(steps).await?;
        Ok(true)
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        self.graph
            .run(query(queries::DELETE_GROUP).param("group_id", group_id))
            .await
            .map_err(store_error)
    }

    async fn clear(&self) -> Result<()> {
        self.graph.run(query(queries::CLEAR)).await.map_err(store_error)?;
        info!(uri = %self.uri, "neo4j store cleared");
        Ok(())
    }

    async fn retrieve_episodes(
        &self,
        group_ids: &[String],
        last_n: usize,
        reference_time: DateTime<Utc>,
    ) -> Result<Vec<EpisodicNode>> {
        let q = query(&format!(
            "{}{} ORDER BY e.valid_at DESC, uuid LIMIT $num_episodes",
            queries::RECENT_EPISODES,
            queries::EPISODE_RETURN
        ))
        .param("reference_time", format_neo4j_datetime(&reference_time))
        .param("group_ids", group_ids.to_vec())
        .param("num_episodes", last_n as i64);

        let mut episodes = self
            .fetch(q)
            .await?
            .iter()
            .map(episode_from_row)
            .collect::<Result<Vec<_>>>()?;
        episodes.reverse();
        Ok(episodes)
    }
}
