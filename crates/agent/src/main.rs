//! Dockmon agent - Docker container and host monitoring daemon
//!
//! This binary polls the local Docker daemon (and any configured remote
//! hosts), keeps a retention-bounded in-memory metrics store, and serves
//! the query/control HTTP API.

use anyhow::Result;
use dockmon_lib::runtime::DockerReaderProvider;
use dockmon_lib::{
    AgentMetrics, CollectionConfig, CollectionLoopBuilder, HostConfig, HostHealthTracker,
    HostRegistry, MetricsStore,
};
use dockmon_lib::hoststats::HostStatsReader;
use dockmon_lib::pressure::PressureReader;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod proxy;

const HTTP_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting dockmon-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    info!(host_id = %config.host_id, host_name = %config.host_name, "Agent configured");

    // The local host is always monitored; extra hosts come from the file.
    let registry = Arc::new(HostRegistry::new());
    registry.upsert(HostConfig {
        id: config.host_id.clone(),
        name: config.host_name.clone(),
        url: None,
        enabled: true,
    });
    if let Some(path) = &config.hosts_file {
        let loaded = registry.load_file(path)?;
        info!(path = %path.display(), hosts = loaded, "Loaded additional hosts");
    }

    let store = Arc::new(MetricsStore::new());
    let health = Arc::new(HostHealthTracker::new());
    let provider = Arc::new(DockerReaderProvider::new());
    let metrics = AgentMetrics::new();

    let collection = CollectionLoopBuilder::new(&config.host_id)
        .provider(provider.clone())
        .registry(registry.clone())
        .store(store.clone())
        .health(health.clone())
        .pressure(Arc::new(PressureReader::new(&config.cgroup_root)))
        .host_stats(Arc::new(HostStatsReader::new()))
        .metrics(metrics.clone())
        .config(CollectionConfig {
            interval: Duration::from_secs(config.collection_interval_secs),
            trim_interval: Duration::from_secs(config.trim_interval_secs),
            retention: Duration::from_secs(config.retention_hours * 60 * 60),
        })
        .build()?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let collection_handle = tokio::spawn(collection.run(shutdown_rx));

    let app_state = Arc::new(api::AppState {
        store,
        health,
        registry,
        provider,
        metrics,
        http: reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?,
        local_host_id: config.host_id.clone(),
    });

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("SIGINT received, shutting down");

    let _ = shutdown_tx.send(());
    let _ = collection_handle.await;
    api_handle.abort();

    Ok(())
}
