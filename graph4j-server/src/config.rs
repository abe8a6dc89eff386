use std::{net::SocketAddr, str::FromStr};

/// Server configuration loaded from environment variables.
///
/// Store, embedding and LLM settings live in [`graph4j_rs::Graph4jConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server. Env: `BIND_ADDR`, default `0.0.0.0:8000`.
    pub bind_addr: SocketAddr,
    /// Capacity of the background ingestion queue. Env: `INGEST_QUEUE_CAPACITY`, default 1024.
    pub ingest_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables, applying defaults.
    ///
    /// # Errors
    /// Returns an error if `BIND_ADDR` is set but not a valid socket address,
    /// or if `INGEST_QUEUE_CAPACITY` is not a positive integer.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_addr = SocketAddr::from_str(&bind_addr)
            .map_err(|e| anyhow::anyhow!("Invalid BIND_ADDR '{}': {}", bind_addr, e))?;

        let ingest_queue_capacity = parse_env_usize("INGEST_QUEUE_CAPACITY", 1024)?;
        if ingest_queue_capacity == 0 {
            anyhow::bail!("INGEST_QUEUE_CAPACITY must be at least 1");
        }

        Ok(Config {
            bind_addr,
            ingest_queue_capacity,
        })
    }
}

fn parse_env_usize(name: &str, default: usize) -> anyhow::Result<usize> {
    match std::env::var(name) {
        Ok(val) => val
            .parse::<usize>()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}
