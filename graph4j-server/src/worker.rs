//! Background ingestion worker.
//!
//! `POST /episodes` enqueues one [`IngestJob`] per episode on a bounded
//! channel drained by a single task, so episodes of one request are ingested
//! in order. On shutdown the channel is closed and queued jobs are drained
//! before the task exits.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use graph4j_rs::nodes::EpisodeInput;
use graph4j_rs::{EmbeddingMode, IngestionCoordinator};

use crate::dto::{EpisodeReport, EpisodeStatus};
use crate::error::ApiError;

#[derive(Debug)]
pub struct IngestJob {
    pub input: EpisodeInput,
    pub group_id: String,
    pub mode: EmbeddingMode,
}

/// Sending half of the ingestion queue. Cheap to clone.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<IngestJob>,
}

impl IngestQueue {
    /// Queue a job, waiting for capacity when the queue is full.
    pub async fn enqueue(&self, job: IngestJob) -> Result<(), ApiError> {
        self.tx
            .send(job)
            .await
            .map_err(|_| ApiError::ServiceUnavailable("ingestion queue is closed".to_string()))
    }

    /// Jobs currently waiting.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Handle to the running worker task.
pub struct IngestWorker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<usize>,
}

impl IngestWorker {
    /// Spawn the worker over `coordinator` with a queue of `capacity` jobs.
    pub fn spawn(coordinator: Arc<IngestionCoordinator>, capacity: usize) -> (IngestQueue, IngestWorker) {
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(coordinator, rx, shutdown_rx));
        (IngestQueue { tx }, IngestWorker { shutdown, handle })
    }

    /// Stop accepting jobs, finish the queued ones, and return how many jobs ran in total.
    pub async fn shutdown(self) -> usize {
        // The worker may already have stopped on its own.
        let _ = self.shutdown.send(());
        match self.handle.await {
            Ok(processed) => processed,
            Err(e) => {
                error!(error = %e, "ingestion worker panicked");
                0
            }
        }
    }
}

async fn run(
    coordinator: Arc<IngestionCoordinator>,
    mut rx: mpsc::Receiver<IngestJob>,
    mut shutdown: oneshot::Receiver<()>,
) -> usize {
    let mut processed = 0;
    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => {
                    process(&coordinator, job).await;
                    processed += 1;
                }
                None => return processed,
            },
            _ = &mut shutdown => break,
        }
    }

    rx.close();
    let mut drained = 0;
    while let Some(job) = rx.recv().await {
        process(&coordinator, job).await;
        drained += 1;
    }
    info!(drained, "ingestion queue drained");
    processed + drained
}

async fn process(coordinator: &IngestionCoordinator, job: IngestJob) {
    debug!(group_id = %job.group_id, mode = ?job.mode, "processing ingestion job");
    let report = match coordinator.ingest(&job.input, &job.group_id, job.mode).await {
        Ok(outcome) => EpisodeReport::from_outcome(&outcome),
        Err(e) => EpisodeReport::failed(job.input.uuid, e),
    };
    match report.status {
        EpisodeStatus::Success => {}
        EpisodeStatus::Partial => warn!(episode = ?report.uuid, failures = ?report.failures, "queued episode partially ingested"),
        EpisodeStatus::Failed => error!(
            episode = ?report.uuid,
            error = report.error.as_deref().unwrap_or(""),
            failures = ?report.failures,
            "queued episode failed"
        ),
    }
}
