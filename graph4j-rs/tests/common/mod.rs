//! Shared fixtures: a scripted extractor and a fault-injecting store.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use graph4j_rs::driver::memory::MemoryDriver;
use graph4j_rs::driver::{fill_missing_embeddings, GraphDriver, StoreQuery};
use graph4j_rs::edges::{EntityEdge, EpisodicEdge};
use graph4j_rs::embedder::hash::HashEmbedder;
use graph4j_rs::embedder::{Embedding, EmbedderClient};
use graph4j_rs::nodes::{EntityNode, EpisodicNode};
use graph4j_rs::pipeline::Extractor;
use graph4j_rs::{BindingName, Bindings, Graph4jError, GraphFragment, Result, StoreBinding};

pub const DIM: usize = 32;

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Extracts a two-entity graph from "<subject> prefers <object>" content,
/// reusing known entities by lowercase name. Counts its calls.
#[derive(Default)]
pub struct ScriptedExtractor {
    calls: AtomicUsize,
    fail: bool,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, episode: &EpisodicNode, known: &[EntityNode]) -> Result<GraphFragment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Graph4jError::Extraction("scripted failure".into()));
        }

        let text = episode.content.to_lowercase();
        let text = text.split_once(": ").map(|(_, c)| c).unwrap_or(&text);
        let (subject, object) = text
            .split_once(" prefers ")
            .or_else(|| text.split_once(" prefer "))
            .map(|(s, o)| (s.trim().to_string(), o.trim().trim_end_matches('.').to_string()))
            .unwrap_or_else(|| (text.trim().to_string(), String::new()));

        let entity = |name: &str, label: &str| {
            let mut node = known
                .iter()
                .find(|n| n.name.to_lowercase() == name)
                .cloned()
                .unwrap_or_else(|| EntityNode::new(name, episode.group_id.clone()));
            node.add_label(label);
            node
        };

        let subject = if subject == "i" { "user".to_string() } else { subject };
        let mut nodes = vec![entity(&subject, "Person")];

        let mut edges = Vec::new();
        if !object.is_empty() {
            let mut obj = entity(&object, "Preference");
            obj.summary = format!("Something {} prefers", nodes[0].name);
            let mut edge = EntityEdge::new(
                nodes[0].uuid,
                obj.uuid,
                "PREFERS",
                format!("{} prefers {}", nodes[0].name, object),
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

// ---------------------------------------------------------------------------
// Embedder
// ---------------------------------------------------------------------------

/// A provider that is always down.
pub struct DownEmbedder;

#[async_trait]
impl EmbedderClient for DownEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(Graph4jError::Embedder("provider unreachable".into()))
    }

    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>> {
        Err(Graph4jError::Embedder("provider unreachable".into()))
    }

    fn dim(&self) -> usize {
        DIM
    }

    fn model(&self) -> &str {
        "down"
    }
}

// ---------------------------------------------------------------------------
// Fault-injecting driver
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Unavailable,
    Constraint,
}

impl Fault {
    fn error(self) -> Graph4jError {
        match self {
            Fault::Unavailable => Graph4jError::StoreUnavailable("injected: connection refused".into()),
            Fault::Constraint => Graph4jError::StoreConstraint("injected: constraint violated".into()),
        }
    }
}

/// Wraps a [`MemoryDriver`], failing writes and/or reads on demand.
pub struct FaultyDriver {
    pub inner: MemoryDriver,
    write_fault: Option<Fault>,
    /// Writes still to fail; `usize::MAX` fails forever.
    write_failures: AtomicUsize,
    read_fault: Option<Fault>,
    /// Reads still to fail; `usize::MAX` fails forever.
    read_failures: AtomicUsize,
    pub write_attempts: AtomicUsize,
    pub read_attempts: AtomicUsize,
}

impl FaultyDriver {
    pub fn healthy() -> Self {
        Self {
            inner: MemoryDriver::new(),
            write_fault: None,
            write_failures: AtomicUsize::new(0),
            read_fault: None,
            read_failures: AtomicUsize::new(0),
            write_attempts: AtomicUsize::new(0),
            read_attempts: AtomicUsize::new(0),
        }
    }

    /// Every write fails with `fault`.
    pub fn down(fault: Fault) -> Self {
        Self {
            write_fault: Some(fault),
            write_failures: AtomicUsize::new(usize::MAX),
            read_fault: Some(fault),
            read_failures: AtomicUsize::new(usize::MAX),
            ..Self::healthy()
        }
    }

    /// The first `n` writes fail with a transient error.
    pub fn flaky(n: usize) -> Self {
        Self {
            write_fault: Some(Fault::Unavailable),
            write_failures: AtomicUsize::new(n),
            ..Self::healthy()
        }
    }

    /// Writes succeed, reads fail with `fault`.
    pub fn unreadable(fault: Fault) -> Self {
        Self {
            read_fault: Some(fault),
            read_failures: AtomicUsize::new(usize::MAX),
            ..Self::healthy()
        }
    }

    /// The first `n` reads fail with a transient error.
    pub fn flaky_reads(n: usize) -> Self {
        Self {
            read_fault: Some(Fault::Unavailable),
            read_failures: AtomicUsize::new(n),
            ..Self::healthy()
        }
    }

    pub fn attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.read_attempts.load(Ordering::SeqCst)
    }

    fn take_write_fault(&self) -> Option<Graph4jError> {
        take_fault(self.write_fault, &self.write_failures)
    }

    fn check_read(&self) -> Result<()> {
        self.read_attempts.fetch_add(1, Ordering::SeqCst);
        match take_fault(self.read_fault, &self.read_failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn take_fault(fault: Option<Fault>, remaining: &AtomicUsize) -> Option<Graph4jError> {
    let fault = fault?;
    let left = remaining.load(Ordering::SeqCst);
    if left == 0 {
        return None;
    }
    if left != usize::MAX {
        remaining.store(left - 1, Ordering::SeqCst);
    }
    Some(fault.error())
}

#[async_trait]
impl GraphDriver for FaultyDriver {
    fn backend(&self) -> &'static str {
        "faulty-memory"
    }

    async fn ping(&self) -> Result<()> {
        self.check_read()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn build_indices_and_constraints(&self) -> Result<()> {
        Ok(())
    }

    async fn bulk_upsert(&self, fragment: &mut GraphFragment, embedder: &dyn EmbedderClient) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        fill_missing_embeddings(fragment, embedder).await?;
        if let Some(err) = self.take_write_fault() {
            return Err(err);
        }
        self.inner.bulk_upsert(fragment, embedder).await
    }

    async fn entity_nodes_by_group(&self, group_id: &str) -> Result<Vec<EntityNode>> {
        self.check_read()?;
        self.inner.entity_nodes_by_group(group_id).await
    }

    async fn search_nodes(&self, query: &StoreQuery) -> Result<Vec<EntityNode>> {
        self.check_read()?;
        self.inner.search_nodes(query).await
    }

    async fn search_edges(&self, query: &StoreQuery) -> Result<Vec<EntityEdge>> {
        self.check_read()?;
        self.inner.search_edges(query).await
    }

    async fn get_entity_edge(&self, uuid: Uuid) -> Result<Option<EntityEdge>> {
        self.check_read()?;
        self.inner.get_entity_edge(uuid).await
    }

    async fn delete_entity_edge(&self, uuid: Uuid) -> Result<bool> {
        self.inner.delete_entity_edge(uuid).await
    }

    async fn delete_episode(&self, uuid: Uuid) -> Result<bool> {
        self.inner.delete_episode(uuid).await
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        self.inner.delete_group(group_id).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn retrieve_episodes(
        &self,
        group_ids: &[String],
        last_n: usize,
        reference_time: DateTime<Utc>,
    ) -> Result<Vec<EpisodicNode>> {
        self.check_read()?;
        self.inner.retrieve_episodes(group_ids, last_n, reference_time).await
    }
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

pub struct Harness {
    pub bindings: Bindings,
    pub fast_store: Arc<FaultyDriver>,
    pub quality_store: Arc<FaultyDriver>,
    pub fast_embedder: Arc<HashEmbedder>,
    pub quality_embedder: Arc<HashEmbedder>,
}

/// Two distinct stores with differently seeded embedders.
pub fn harness(fast_store: FaultyDriver, quality_store: FaultyDriver) -> Harness {
    let fast_store = Arc::new(fast_store);
    let quality_store = Arc::new(quality_store);
    let fast_embedder = Arc::new(HashEmbedder::new("hash-fast", 7, DIM));
    let quality_embedder = Arc::new(HashEmbedder::new("hash-quality", 11, DIM));
    let bindings = Bindings::new(
        StoreBinding::new(BindingName::Fast, fast_store.clone(), fast_embedder.clone()),
        StoreBinding::new(BindingName::Quality, quality_store.clone(), quality_embedder.clone()),
    );
    Harness {
        bindings,
        fast_store,
        quality_store,
        fast_embedder,
        quality_embedder,
    }
}

pub fn healthy_harness() -> Harness {
    harness(FaultyDriver::healthy(), FaultyDriver::healthy())
}

/// Two healthy stores behind the given providers.
pub fn with_providers(
    fast: Arc<dyn EmbedderClient>,
    quality: Arc<dyn EmbedderClient>,
) -> (Bindings, Arc<FaultyDriver>, Arc<FaultyDriver>) {
    let fast_store = Arc::new(FaultyDriver::healthy());
    let quality_store = Arc::new(FaultyDriver::healthy());
    let bindings = Bindings::new(
        StoreBinding::new(BindingName::Fast, fast_store.clone(), fast),
        StoreBinding::new(BindingName::Quality, quality_store.clone(), quality),
    );
    (bindings, fast_store, quality_store)
}
