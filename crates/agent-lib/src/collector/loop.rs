//! Metrics collection loop
//!
//! On every tick the loop fans out one poll per enabled host. A failing
//! host records its error and is retried on the normal cadence; it never
//! delays or aborts collection for the others. Trim runs on its own
//! interval, decoupled from the poll tick.

use crate::error::CollectError;
use crate::health::HostHealthTracker;
use crate::hoststats::HostStatsReader;
use crate::models::{HostConfig, HostMetricSnapshot};
use crate::observability::AgentMetrics;
use crate::pressure::PressureReader;
use crate::registry::HostRegistry;
use crate::runtime::ReaderProvider;
use crate::store::MetricsStore;
use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Configuration for the collection loop.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Poll interval across hosts (default: 10 seconds)
    pub interval: Duration,
    /// How often the store trims expired points (default: 5 minutes)
    pub trim_interval: Duration,
    /// Retention horizon handed to the store's trim (default: 6 hours)
    pub retention: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            trim_interval: Duration::from_secs(300),
            retention: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// Drives periodic collection across all enabled hosts.
pub struct CollectionLoop {
    provider: Arc<dyn ReaderProvider>,
    registry: Arc<HostRegistry>,
    store: Arc<MetricsStore>,
    health: Arc<HostHealthTracker>,
    pressure: Arc<PressureReader>,
    host_stats: Arc<HostStatsReader>,
    metrics: AgentMetrics,
    config: CollectionConfig,
    local_host_id: String,
}

impl CollectionLoop {
    /// Run until the shutdown signal fires.
    ///
    /// Timed collection does not begin until the local runtime answers a
    /// ping, so a daemon that is still coming up does not produce a flood
    /// of immediate failures.
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting metrics collection loop"
        );

        if !self.wait_for_local_runtime(&mut shutdown).await {
            return;
        }

        let mut ticker = interval(self.config.interval);
        let mut trim_ticker = interval(self.config.trim_interval);
        // The first tick of a tokio interval fires immediately; let the
        // trim ticker's initial no-op pass through rather than special-case it.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.collect_all().await;
                }
                _ = trim_ticker.tick() => {
                    let retention = chrono::Duration::from_std(self.config.retention)
                        .unwrap_or_else(|_| chrono::Duration::hours(6));
                    self.store.trim(retention);
                    let stats = self.store.stats();
                    debug!(
                        series = stats.series_count,
                        points = stats.total_points,
                        "Store trimmed"
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutting down metrics collection loop");
                    break;
                }
            }
        }
    }

    async fn wait_for_local_runtime(
        &self,
        shutdown: &mut tokio::sync::broadcast::Receiver<()>,
    ) -> bool {
        let mut ticker = interval(self.config.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.ping_local().await {
                        Ok(()) => {
                            info!("Local container runtime reachable, starting collection");
                            return true;
                        }
                        Err(e) => {
                            warn!(error = %e, "Local container runtime not reachable yet");
                        }
                    }
                }
                _ = shutdown.recv() => return false,
            }
        }
    }

    async fn ping_local(&self) -> Result<(), CollectError> {
        let host = self
            .registry
            .get(&self.local_host_id)
            .ok_or_else(|| CollectError::HostNotFound(self.local_host_id.clone()))?;
        let reader = self.provider.reader_for(&host).await?;
        reader.ping().await
    }

    /// One collection cycle: fan out across enabled hosts, each isolated.
    pub async fn collect_all(&self) {
        self.metrics.inc_cycle();
        let hosts = self.registry.list_enabled();

        let results = join_all(hosts.iter().map(|host| async move {
            let outcome = self.collect_host(host).await;
            (host, outcome)
        }))
        .await;

        let mut containers_seen = 0;
        for (host, outcome) in results {
            match outcome {
                Ok(count) => {
                    containers_seen += count;
                    self.health.record_success(&host.id);
                }
                Err(e) => {
                    self.metrics.inc_error();
                    self.health.record_failure(&host.id, e.to_string());
                    // The host series still gets a reading this tick, so the
                    // up/down timeline has no gaps.
                    self.store
                        .append_host(HostMetricSnapshot::down(&host.id, &host.name));
                    warn!(host_id = %host.id, error = %e, "Host poll failed");
                }
            }
        }
        self.metrics.set_containers_monitored(containers_seen as i64);
    }

    /// Poll one host: enumerate containers and snapshot each.
    /// Returns the number of containers successfully sampled.
    async fn collect_host(&self, host: &HostConfig) -> Result<usize, CollectError> {
        let reader = self.provider.reader_for(host).await?;
        reader.ping().await?;

        let is_local = host.id == self.local_host_id;
        let containers = reader.list_containers(false).await?;
        let mut collected = 0;

        for container in &containers {
            match reader.snapshot(&container.id).await {
                Ok(snapshot) => {
                    // Pressure comes from the local cgroup filesystem, so
                    // only local containers carry it; remote ones keep null.
                    let snapshot = if is_local {
                        let sample = self.pressure.read(&container.id).await;
                        snapshot.with_pressure(&sample)
                    } else {
                        snapshot
                    };
                    self.store.append_container(snapshot);
                    self.metrics.inc_snapshot();
                    collected += 1;
                }
                Err(e) if e.is_skippable() => {
                    debug!(
                        container_id = %container.id,
                        error = %e,
                        "Container vanished during poll, skipping"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if is_local {
            match self.host_stats.read_snapshot(&host.id, &host.name).await {
                Ok(host_snapshot) => self.store.append_host(host_snapshot),
                Err(e) => warn!(host_id = %host.id, error = %e, "Host stats read failed"),
            }
        }

        Ok(collected)
    }
}

/// Builder for the collection loop.
pub struct CollectionLoopBuilder {
    provider: Option<Arc<dyn ReaderProvider>>,
    registry: Option<Arc<HostRegistry>>,
    store: Option<Arc<MetricsStore>>,
    health: Option<Arc<HostHealthTracker>>,
    pressure: Option<Arc<PressureReader>>,
    host_stats: Option<Arc<HostStatsReader>>,
    metrics: AgentMetrics,
    config: CollectionConfig,
    local_host_id: String,
}

impl CollectionLoopBuilder {
    pub fn new(local_host_id: impl Into<String>) -> Self {
        Self {
            provider: None,
            registry: None,
            store: None,
            health: None,
            pressure: None,
            host_stats: None,
            metrics: AgentMetrics::new(),
            config: CollectionConfig::default(),
            local_host_id: local_host_id.into(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn ReaderProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn registry(mut self, registry: Arc<HostRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn health(mut self, health: Arc<HostHealthTracker>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn pressure(mut self, pressure: Arc<PressureReader>) -> Self {
        self.pressure = Some(pressure);
        self
    }

    pub fn host_stats(mut self, host_stats: Arc<HostStatsReader>) -> Self {
        self.host_stats = Some(host_stats);
        self
    }

    pub fn metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(mut self, config: CollectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<CollectionLoop> {
        Ok(CollectionLoop {
            provider: self
                .provider
                .ok_or_else(|| anyhow::anyhow!("Reader provider is required"))?,
            registry: self
                .registry
                .ok_or_else(|| anyhow::anyhow!("Host registry is required"))?,
            store: self
                .store
                .ok_or_else(|| anyhow::anyhow!("Metrics store is required"))?,
            health: self
                .health
                .ok_or_else(|| anyhow::anyhow!("Health tracker is required"))?,
            pressure: self
                .pressure
                .ok_or_else(|| anyhow::anyhow!("Pressure reader is required"))?,
            host_stats: self
                .host_stats
                .ok_or_else(|| anyhow::anyhow!("Host stats reader is required"))?,
            metrics: self.metrics,
            config: self.config,
            local_host_id: self.local_host_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ContainerMetricSnapshot, ContainerStatus, ContainerSummary, ControlAction,
        ControlOutcome, RuntimeHostInfo,
    };
    use crate::runtime::RuntimeReader;
    use crate::store::MetricsFilter;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;

    struct MockReader {
        host_id: String,
        containers: Vec<ContainerSummary>,
        vanished: HashSet<String>,
        unreachable: bool,
    }

    impl MockReader {
        fn up(host_id: &str, container_ids: &[&str]) -> Self {
            Self {
                host_id: host_id.to_string(),
                containers: container_ids
                    .iter()
                    .map(|id| ContainerSummary {
                        id: id.to_string(),
                        name: id.to_string(),
                        state: "running".to_string(),
                    })
                    .collect(),
                vanished: HashSet::new(),
                unreachable: false,
            }
        }

        fn down(host_id: &str) -> Self {
            Self {
                host_id: host_id.to_string(),
                containers: Vec::new(),
                vanished: HashSet::new(),
                unreachable: true,
            }
        }
    }

    #[async_trait]
    impl RuntimeReader for MockReader {
        async fn ping(&self) -> Result<(), CollectError> {
            if self.unreachable {
                Err(CollectError::RuntimeUnavailable(
                    "connection refused".to_string(),
                ))
            } else {
                Ok(())
            }
        }

        async fn list_containers(
            &self,
            _all: bool,
        ) -> Result<Vec<ContainerSummary>, CollectError> {
            Ok(self.containers.clone())
        }

        async fn container_status(
            &self,
            container_id: &str,
        ) -> Result<ContainerStatus, CollectError> {
            Ok(ContainerStatus {
                id: container_id.to_string(),
                name: container_id.to_string(),
                status: "running".to_string(),
                running: true,
                paused: false,
            })
        }

        async fn snapshot(
            &self,
            container_id: &str,
        ) -> Result<ContainerMetricSnapshot, CollectError> {
            if self.vanished.contains(container_id) {
                return Err(CollectError::ContainerNotFound(container_id.to_string()));
            }
            Ok(ContainerMetricSnapshot {
                host_id: self.host_id.clone(),
                host_name: self.host_id.clone(),
                container_id: container_id.to_string(),
                container_name: container_id.to_string(),
                timestamp: Utc::now(),
                cpu_percent: 5.0,
                memory_bytes: 1024,
                memory_percent: 1.0,
                network_rx_bytes: 0,
                network_tx_bytes: 0,
                disk_read_bytes: 0,
                disk_write_bytes: 0,
                uptime_seconds: 60,
                running: true,
                cpu_pressure_some: None,
                cpu_pressure_full: None,
                memory_pressure_some: None,
                memory_pressure_full: None,
                io_pressure_some: None,
                io_pressure_full: None,
            })
        }

        async fn control(
            &self,
            _action: ControlAction,
            _container_id: &str,
        ) -> Result<ControlOutcome, CollectError> {
            Ok(ControlOutcome::ok())
        }

        async fn host_info(&self) -> Result<RuntimeHostInfo, CollectError> {
            Ok(RuntimeHostInfo {
                name: self.host_id.clone(),
                cpus: 4,
                total_memory_bytes: 8 * 1024 * 1024 * 1024,
            })
        }
    }

    struct MockProvider {
        readers: dashmap::DashMap<String, Arc<MockReader>>,
    }

    impl MockProvider {
        fn new(readers: Vec<MockReader>) -> Self {
            let map = dashmap::DashMap::new();
            for reader in readers {
                map.insert(reader.host_id.clone(), Arc::new(reader));
            }
            Self { readers: map }
        }
    }

    #[async_trait]
    impl ReaderProvider for MockProvider {
        async fn reader_for(
            &self,
            host: &HostConfig,
        ) -> Result<Arc<dyn RuntimeReader>, CollectError> {
            self.readers
                .get(&host.id)
                .map(|r| r.clone() as Arc<dyn RuntimeReader>)
                .ok_or_else(|| CollectError::HostNotFound(host.id.clone()))
        }
    }

    fn host(id: &str) -> HostConfig {
        HostConfig {
            id: id.to_string(),
            name: id.to_string(),
            url: if id == "local" {
                None
            } else {
                Some(format!("http://{id}:2375"))
            },
            enabled: true,
        }
    }

    fn build_loop(
        provider: MockProvider,
        registry: Arc<HostRegistry>,
        store: Arc<MetricsStore>,
        health: Arc<HostHealthTracker>,
        pressure_root: &std::path::Path,
    ) -> CollectionLoop {
        CollectionLoopBuilder::new("local")
            .provider(Arc::new(provider))
            .registry(registry)
            .store(store)
            .health(health)
            .pressure(Arc::new(PressureReader::new(pressure_root)))
            .host_stats(Arc::new(HostStatsReader::with_proc_root(pressure_root)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn collect_appends_snapshots_and_records_success() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = Arc::new(HostRegistry::new());
        registry.upsert(host("local"));
        let store = Arc::new(MetricsStore::new());
        let health = Arc::new(HostHealthTracker::new());

        let provider = MockProvider::new(vec![MockReader::up("local", &["c1", "c2"])]);
        let collection = build_loop(provider, registry, store.clone(), health.clone(), tmp.path());

        collection.collect_all().await;

        let results = store.query_containers(&MetricsFilter::default());
        assert_eq!(results.len(), 2);
        assert!(health.get("local").unwrap().healthy);
    }

    #[tokio::test]
    async fn failing_host_is_isolated_from_healthy_ones() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = Arc::new(HostRegistry::new());
        registry.upsert(host("local"));
        registry.upsert(host("edge-1"));
        let store = Arc::new(MetricsStore::new());
        let health = Arc::new(HostHealthTracker::new());

        let provider = MockProvider::new(vec![
            MockReader::up("local", &["c1"]),
            MockReader::down("edge-1"),
        ]);
        let collection = build_loop(provider, registry, store.clone(), health.clone(), tmp.path());

        collection.collect_all().await;

        // The healthy host still collected.
        assert_eq!(store.query_containers(&MetricsFilter::default()).len(), 1);
        assert!(health.get("local").unwrap().healthy);

        let edge = health.get("edge-1").unwrap();
        assert!(!edge.healthy);
        assert!(edge.last_error.as_deref().unwrap().contains("refused"));
    }

    #[tokio::test]
    async fn failed_host_poll_appends_a_down_reading() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = Arc::new(HostRegistry::new());
        registry.upsert(host("local"));
        registry.upsert(host("edge-1"));
        let store = Arc::new(MetricsStore::new());
        let health = Arc::new(HostHealthTracker::new());

        let provider = MockProvider::new(vec![
            MockReader::up("local", &[]),
            MockReader::down("edge-1"),
        ]);
        let collection = build_loop(provider, registry, store.clone(), health.clone(), tmp.path());

        collection.collect_all().await;
        collection.collect_all().await;

        let filter = MetricsFilter {
            host_ids: Some(vec!["edge-1".to_string()]),
            ..Default::default()
        };
        let readings = store.query_hosts(&filter);
        assert_eq!(readings.len(), 2);
        assert!(readings.iter().all(|r| !r.up));
        assert!(readings.iter().all(|r| r.hostname == "edge-1"));
    }

    #[tokio::test]
    async fn vanished_container_is_skipped_not_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = Arc::new(HostRegistry::new());
        registry.upsert(host("local"));
        let store = Arc::new(MetricsStore::new());
        let health = Arc::new(HostHealthTracker::new());

        let mut reader = MockReader::up("local", &["c1", "gone", "c3"]);
        reader.vanished.insert("gone".to_string());
        let provider = MockProvider::new(vec![reader]);
        let collection = build_loop(provider, registry, store.clone(), health.clone(), tmp.path());

        collection.collect_all().await;

        let results = store.query_containers(&MetricsFilter::default());
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|s| s.container_id != "gone"));
        // The host poll as a whole still counts as a success.
        assert!(health.get("local").unwrap().healthy);
    }

    #[tokio::test]
    async fn disabled_hosts_are_not_polled() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = Arc::new(HostRegistry::new());
        registry.upsert(host("local"));
        registry.upsert(HostConfig {
            enabled: false,
            ..host("edge-1")
        });
        let store = Arc::new(MetricsStore::new());
        let health = Arc::new(HostHealthTracker::new());

        let provider = MockProvider::new(vec![
            MockReader::up("local", &[]),
            MockReader::up("edge-1", &["c9"]),
        ]);
        let collection = build_loop(provider, registry, store.clone(), health.clone(), tmp.path());

        collection.collect_all().await;

        assert!(store.query_containers(&MetricsFilter::default()).is_empty());
        assert!(health.get("edge-1").is_none());
    }

    #[test]
    fn builder_requires_all_collaborators() {
        let result = CollectionLoopBuilder::new("local").build();
        assert!(result.is_err());
    }

    #[test]
    fn collection_config_defaults() {
        let config = CollectionConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.trim_interval, Duration::from_secs(300));
        assert_eq!(config.retention, Duration::from_secs(6 * 60 * 60));
    }
}
