#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;

use graph4j_rs::driver::memory::MemoryDriver;
use graph4j_rs::driver::GraphDriver;
use graph4j_rs::edges::{EntityEdge, EpisodicEdge};
use graph4j_rs::embedder::hash::HashEmbedder;
use graph4j_rs::nodes::{EntityNode, EpisodicNode};
use graph4j_rs::pipeline::Extractor;
use graph4j_rs::{
    BindingName, Bindings, GraphFragment, IngestionCoordinator, Result, RetryConfig,
    SearchCoordinator, StoreBinding,
};
use graph4j_server::worker::{IngestQueue, IngestWorker};
use graph4j_server::{create_router, AppState};

/// Turns "<subject> prefers <object>" into two entities and one PREFERS fact.
pub struct PrefersExtractor;

#[async_trait]
impl Extractor for PrefersExtractor {
    async fn extract(&self, episode: &EpisodicNode, _known: &[EntityNode]) -> Result<GraphFragment> {
        let text = episode.content.to_lowercase();
        let text = text.split_once(": ").map(|(_, c)| c).unwrap_or(&text).to_string();
        let (subject, object) = text.split_once(" prefers ").unwrap_or((text.as_str(), ""));

        let mut nodes = vec![EntityNode::new(subject.trim(), episode.group_id.clone())];
        let mut edges = Vec::new();
        if !object.trim().is_empty() {
            let mut obj = EntityNode::new(object.trim(), episode.group_id.clone());
            obj.add_label("Preference");
            let mut edge = EntityEdge::new(
                nodes[0].uuid,
                obj.uuid,
                "PREFERS",
                format!("{} prefers {}", subject.trim(), object.trim()),
                episode.group_id.clone(),
            );
            edge.episodes.push(episode.uuid);
            edges.push(edge);
            nodes.push(obj);
        }

        let mut episode = episode.clone();
        episode.entity_edges = edges.iter().map(|e| e.uuid).collect();
        let episodic_edges = nodes
            .iter()
            .map(|n| EpisodicEdge::mentions(episode.uuid, n.uuid, episode.group_id.clone()))
            .collect();
        Ok(GraphFragment {
            episode,
            nodes,
            edges,
            episodic_edges,
        })
    }
}

pub struct TestApp {
    pub router: axum::Router,
    pub fast: Arc<MemoryDriver>,
    pub quality: Arc<MemoryDriver>,
    pub queue: IngestQueue,
    pub worker: IngestWorker,
}

/// Router over two in-memory stores.
pub fn test_app() -> TestApp {
    let fast = Arc::new(MemoryDriver::new());
    let quality = Arc::new(MemoryDriver::new());
    let fast_driver: Arc<dyn GraphDriver> = fast.clone();
    let quality_driver: Arc<dyn GraphDriver> = quality.clone();
    let bindings = Bindings::new(
        StoreBinding::new(BindingName::Fast, fast_driver, Arc::new(HashEmbedder::new("fast", 7, 32))),
        StoreBinding::new(BindingName::Quality, quality_driver, Arc::new(HashEmbedder::new("quality", 11, 32))),
    );

    let ingestion = Arc::new(
        IngestionCoordinator::new(bindings.clone(), Arc::new(PrefersExtractor)).with_retry(RetryConfig::none()),
    );
    let search = Arc::new(SearchCoordinator::new(bindings).with_retry(RetryConfig::none()));
    let (queue, worker) = IngestWorker::spawn(Arc::clone(&ingestion), 16);
    let router = create_router(AppState::new(ingestion, search, queue.clone()));

    TestApp {
        router,
        fast,
        quality,
        queue,
        worker,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::delete(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, json: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
