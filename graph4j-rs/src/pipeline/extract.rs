//! Extraction engine: episode → [`GraphFragment`].

use std::collections::HashMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use crate::edges::{EntityEdge, EpisodicEdge};
use crate::errors::{Graph4jError, Result};
use crate::llm_client::openai::OpenAiClient;
use crate::llm_client::LlmClient;
use crate::nodes::entity::normalize_name;
use crate::nodes::{EntityNode, EpisodicNode};
use crate::prompts;
use crate::utils::{normalize_whitespace, parse_flexible_datetime};

use super::GraphFragment;

/// Turns one episode into a graph fragment.
///
/// `known` holds the group's existing entities; an extracted entity with the
/// same normalized name reuses that node's uuid. Extraction never touches a
/// store and never embeds: each store's write computes its own vectors.
///
/// Fails with [`Graph4jError::Extraction`] on upstream LLM failure and never
/// returns a partial fragment.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, episode: &EpisodicNode, known: &[EntityNode]) -> Result<GraphFragment>;
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractedEntity {
    name: String,
    entity_type: String,
    summary: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractedEntities {
    entities: Vec<ExtractedEntity>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractedFact {
    source: String,
    target: String,
    relation_type: String,
    fact: String,
    valid_at: Option<String>,
    invalid_at: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractedFacts {
    facts: Vec<ExtractedFact>,
}

/// LLM-backed extractor: one structured call for entities, one for facts.
pub struct LlmExtractor {
    llm: OpenAiClient,
}

impl LlmExtractor {
    pub fn new(llm: OpenAiClient) -> Self {
        Self { llm }
    }

    /// Resolve extracted entities against each other and against the group's
    /// existing nodes. Returns nodes in first-mention order.
    fn resolve_entities(
        episode: &EpisodicNode,
        extracted: Vec<ExtractedEntity>,
        existing: &[EntityNode],
    ) -> Vec<EntityNode> {
        let mut known: HashMap<String, EntityNode> = existing
            .iter()
            .map(|n| (n.normalized_name(), n.clone()))
            .collect();

        let mut order: Vec<String> = Vec::new();
        let mut resolved: HashMap<String, EntityNode> = HashMap::new();

        for entity in extracted {
            let name = normalize_whitespace(&entity.name);
            if name.is_empty() {
                continue;
            }
            let key = normalize_name(&name);
            let summary = normalize_whitespace(&entity.summary);
            let label = entity.entity_type.trim();

            let node = resolved.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                known
                    .remove(&key)
                    .unwrap_or_else(|| EntityNode::new(name.clone(), episode.group_id.clone()))
            });
            node.add_label(label);
            if summary.len() > node.summary.len() {
                node.summary = summary;
            }
        }

        order.into_iter().filter_map(|k| resolved.remove(&k)).collect()
    }

    fn build_edges(episode: &EpisodicNode, nodes: &[EntityNode], facts: Vec<ExtractedFact>) -> Vec<EntityEdge> {
        let by_name: HashMap<String, uuid::Uuid> =
            nodes.iter().map(|n| (n.normalized_name(), n.uuid)).collect();

        let mut seen = std::collections::HashSet::new();
        let mut edges = Vec::new();
        for fact in facts {
            let (Some(&src), Some(&tgt)) = (
                by_name.get(&normalize_name(&fact.source)),
                by_name.get(&normalize_name(&fact.target)),
            ) else {
                debug!(source = %fact.source, target = %fact.target, "dropping fact with unknown entity");
                continue;
            };
            let text = normalize_whitespace(&fact.fact);
            if src == tgt || text.is_empty() || !seen.insert((src, tgt, text.to_lowercase())) {
                continue;
            }

            let relation = fact.relation_type.trim().to_uppercase().replace(' ', "_");
            let mut edge = EntityEdge::new(src, tgt, relation, text, episode.group_id.clone());
            edge.valid_at = fact.valid_at.as_deref().and_then(parse_flexible_datetime);
            edge.invalid_at = fact.invalid_at.as_deref().and_then(parse_flexible_datetime);
            edge.episodes.push(episode.uuid);
            edges.push(edge);
        }
        edges
    }
}

fn extraction_error(err: Graph4jError) -> Graph4jError {
    match err {
        Graph4jError::Extraction(_) => err,
        other => Graph4jError::Extraction(other.to_string()),
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(&self, episode: &EpisodicNode, known: &[EntityNode]) -> Result<GraphFragment> {
        let entities: ExtractedEntities = self
            .llm
            .generate_structured(&prompts::extract_nodes::build(episode))
            .await
            .map_err(extraction_error)?;

        let nodes = Self::resolve_entities(episode, entities.entities, known);

        let edges = if nodes.len() < 2 {
            Vec::new()
        } else {
            let names: Vec<String> = nodes.iter().map(|n| n.name.clone()).collect();
            let facts: ExtractedFacts = self
                .llm
                .generate_structured(&prompts::extract_edges::build(episode, &names))
                .await
                .map_err(extraction_error)?;
            Self::build_edges(episode, &nodes, facts.facts)
        };

        let mut episode = episode.clone();
        episode.entity_edges = edges.iter().map(|e| e.uuid).collect();
        let episodic_edges = nodes
            .iter()
            .map(|n| EpisodicEdge::mentions(episode.uuid, n.uuid, episode.group_id.clone()))
            .collect();

        let fragment = GraphFragment {
            episode,
            nodes,
            edges,
            episodic_edges,
        };

        debug!(
            episode = %fragment.episode.uuid,
            nodes = fragment.nodes.len(),
            edges = fragment.edges.len(),
            "extraction complete"
        );
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::llm_client::openai::CacheConfig;
    use crate::nodes::{EpisodeInput, EpisodeType};

    fn completion(content: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "created": 1700000000_u64,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content.to_string() },
                "finish_reason": "stop",
            }],
        })
    }

    async fn mount(server: &MockServer, marker: &str, content: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains(marker))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
            .mount(server)
            .await;
    }

    fn extractor(server: &MockServer) -> LlmExtractor {
        LlmExtractor::new(
            OpenAiClient::with_base_url("sk-test", "gpt-4o", server.uri(), CacheConfig::default())
                .with_retry_budget(Duration::from_millis(100)),
        )
    }

    fn coffee_episode() -> EpisodicNode {
        EpisodeInput::new("I prefer dark roast coffee", EpisodeType::Message)
            .with_role("user", "user")
            .to_episode("g1")
    }

    #[tokio::test]
    async fn extracts_entities_and_facts_without_vectors() {
        let server = MockServer::start().await;
        mount(
            &server,
            "extracts entity nodes",
            json!({ "entities": [
                { "name": "user", "entity_type": "Person", "summary": "The speaker." },
                { "name": "Dark  Roast Coffee", "entity_type": "Preference", "summary": "A coffee the user prefers." },
                { "name": "dark roast coffee", "entity_type": "Topic", "summary": "" },
            ]}),
        )
        .await;
        mount(
            &server,
            "fact triples",
            json!({ "facts": [
                { "source": "user", "target": "dark roast coffee", "relation_type": "prefers",
                  "fact": "The user prefers dark roast coffee.", "valid_at": "2024-05-01", "invalid_at": null },
                { "source": "user", "target": "espresso", "relation_type": "LIKES",
                  "fact": "The user likes espresso.", "valid_at": null, "invalid_at": null },
            ]}),
        )
        .await;

        let fragment = extractor(&server).extract(&coffee_episode(), &[]).await.unwrap();

        assert_eq!(fragment.nodes.len(), 2);
        let coffee = &fragment.nodes[1];
        assert_eq!(coffee.name, "Dark Roast Coffee");
        assert!(coffee.labels.contains(&"Preference".to_string()));
        assert!(coffee.labels.contains(&"Topic".to_string()));

        assert_eq!(fragment.edges.len(), 1);
        let edge = &fragment.edges[0];
        assert_eq!(edge.name, "PREFERS");
        assert_eq!(edge.target_node_uuid, coffee.uuid);
        assert!(edge.valid_at.is_some());
        assert_eq!(edge.episodes, vec![fragment.episode.uuid]);

        assert_eq!(fragment.episode.entity_edges, vec![edge.uuid]);
        assert_eq!(fragment.episodic_edges.len(), 2);
        assert!(fragment.nodes.iter().all(|n| n.name_embedding.is_none()));
        assert!(fragment.edges.iter().all(|e| e.fact_embedding.is_none()));
    }

    #[tokio::test]
    async fn reuses_existing_group_nodes() {
        let server = MockServer::start().await;
        mount(
            &server,
            "extracts entity nodes",
            json!({ "entities": [
                { "name": "Coffee", "entity_type": "Preference", "summary": "" },
            ]}),
        )
        .await;

        let existing = EntityNode::new("coffee", "g1");

        let fragment = extractor(&server)
            .extract(&coffee_episode(), std::slice::from_ref(&existing))
            .await
            .unwrap();
        assert_eq!(fragment.nodes.len(), 1);
        assert_eq!(fragment.nodes[0].uuid, existing.uuid);
        assert!(fragment.edges.is_empty());
    }

    #[tokio::test]
    async fn llm_failure_is_extraction_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "bad request", "type": "invalid_request_error", "param": null, "code": null }
            })))
            .mount(&server)
            .await;

        let err = extractor(&server)
            .extract(&coffee_episode(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Graph4jError::Extraction(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_llm_output_is_extraction_error() {
        let server = MockServer::start().await;
        mount(&server, "extracts entity nodes", json!({ "nodes": [] })).await;

        let err = extractor(&server)
            .extract(&coffee_episode(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Graph4jError::Extraction(_)));
    }
}
