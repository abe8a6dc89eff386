use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

use graph4j_rs::llm_client::openai::{CacheConfig, OpenAiClient};
use graph4j_rs::pipeline::LlmExtractor;
use graph4j_rs::{Bindings, Graph4jConfig, IngestionCoordinator, SearchCoordinator};
use graph4j_server::config::Config;
use graph4j_server::worker::IngestWorker;
use graph4j_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("graph4j_server=info".parse()?)
                .add_directive("graph4j_rs=info".parse()?),
        )
        .json()
        .init();

    info!("graph4j-server starting");

    // ── Config ────────────────────────────────────────────────────────────────
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;
    let graph_config = Graph4jConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        addr = %config.bind_addr,
        backend = ?graph_config.store_backend,
        model = %graph_config.model_name,
        "configuration loaded"
    );

    // ── Stores ────────────────────────────────────────────────────────────────
    let bindings = Bindings::connect(&graph_config).await?;
    for binding in bindings.distinct_stores() {
        binding.driver.build_indices_and_constraints().await?;
    }

    // ── Coordinators ──────────────────────────────────────────────────────────
    let llm = match &graph_config.openai_base_url {
        Some(url) => OpenAiClient::with_base_url(
            &graph_config.openai_api_key,
            &graph_config.model_name,
            url,
            CacheConfig::default(),
        ),
        None => OpenAiClient::new(
            &graph_config.openai_api_key,
            &graph_config.model_name,
            CacheConfig::default(),
        ),
    };
    let ingestion = Arc::new(
        IngestionCoordinator::new(bindings.clone(), Arc::new(LlmExtractor::new(llm)))
            .with_retry(graph_config.retry),
    );
    let search = Arc::new(SearchCoordinator::new(bindings.clone()).with_retry(graph_config.retry));

    let (queue, worker) = IngestWorker::spawn(Arc::clone(&ingestion), config.ingest_queue_capacity);
    let app = create_router(AppState::new(ingestion, search, queue));

    // ── Listen ────────────────────────────────────────────────────────────────
    info!(addr = %config.bind_addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and every queue sender) is gone; finish queued episodes.
    let processed = worker.shutdown().await;
    info!(processed, "ingestion worker stopped");

    for binding in bindings.distinct_stores() {
        if let Err(e) = binding.driver.close().await {
            warn!(binding = %binding.name, error = %e, "error closing store");
        }
    }

    info!("server stopped");
    Ok(())
}

/// Graceful shutdown on SIGTERM or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl-C, shutting down"); }
        _ = terminate => { info!("received SIGTERM, shutting down"); }
    }
}
