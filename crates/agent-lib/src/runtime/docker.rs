//! Docker-backed runtime reader
//!
//! A single one-shot stats call carries both the pre- and post-sample CPU
//! counters, so one network round trip yields everything the CPU delta
//! formula needs. RX/TX bytes are summed across all interfaces and block
//! I/O across all devices, not just the first entry.

use super::RuntimeReader;
use crate::error::CollectError;
use crate::models::{
    ContainerMetricSnapshot, ContainerStatus, ContainerSummary, ControlAction, ControlOutcome,
    RuntimeHostInfo,
};
use async_trait::async_trait;
use bollard::container::{
    ListContainersOptions, RestartContainerOptions, StartContainerOptions, Stats, StatsOptions,
    StopContainerOptions,
};
use bollard::Docker;
use chrono::{DateTime, Datelike, Utc};
use futures::StreamExt;

/// Bound on in-flight runtime I/O so shutdown never hangs on a dead host.
const CLIENT_TIMEOUT_SECS: u64 = 30;

pub struct DockerReader {
    docker: Docker,
    host_id: String,
    host_name: String,
}

impl DockerReader {
    /// Connect to the local Docker daemon (unix socket defaults).
    pub fn connect_local(host_id: &str, host_name: &str) -> Result<Self, CollectError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| CollectError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self {
            docker,
            host_id: host_id.to_string(),
            host_name: host_name.to_string(),
        })
    }

    /// Connect to a remote Docker daemon over HTTP.
    pub fn connect_http(url: &str, host_id: &str, host_name: &str) -> Result<Self, CollectError> {
        let docker = Docker::connect_with_http(url, CLIENT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            .map_err(|e| CollectError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self {
            docker,
            host_id: host_id.to_string(),
            host_name: host_name.to_string(),
        })
    }

    fn map_container_err(container_id: &str, err: bollard::errors::Error) -> CollectError {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => CollectError::ContainerNotFound(container_id.to_string()),
            other => CollectError::RuntimeUnavailable(other.to_string()),
        }
    }

    fn snapshot_from_stats(
        &self,
        container_id: &str,
        name: String,
        running: bool,
        uptime_seconds: u64,
        stats: &Stats,
    ) -> ContainerMetricSnapshot {
        let cpu_percent = cpu_percent(
            stats.cpu_stats.cpu_usage.total_usage,
            stats.precpu_stats.cpu_usage.total_usage,
            stats.cpu_stats.system_cpu_usage.unwrap_or(0),
            stats.precpu_stats.system_cpu_usage.unwrap_or(0),
            stats.cpu_stats.online_cpus.unwrap_or(1),
        );

        let memory_bytes = stats.memory_stats.usage.unwrap_or(0);
        let memory_limit = stats.memory_stats.limit.unwrap_or(0);
        let memory_percent = if memory_limit > 0 {
            memory_bytes as f64 / memory_limit as f64 * 100.0
        } else {
            0.0
        };

        let (network_rx_bytes, network_tx_bytes) = stats
            .networks
            .as_ref()
            .map(|networks| {
                networks.values().fold((0u64, 0u64), |(rx, tx), net| {
                    (rx + net.rx_bytes, tx + net.tx_bytes)
                })
            })
            .unwrap_or((0, 0));

        let (disk_read_bytes, disk_write_bytes) = blkio_totals(
            stats
                .blkio_stats
                .io_service_bytes_recursive
                .as_deref()
                .unwrap_or(&[])
                .iter()
                .map(|entry| (entry.op.as_str(), entry.value)),
        );

        ContainerMetricSnapshot {
            host_id: self.host_id.clone(),
            host_name: self.host_name.clone(),
            container_id: container_id.to_string(),
            container_name: name,
            timestamp: Utc::now(),
            cpu_percent,
            memory_bytes,
            memory_percent,
            network_rx_bytes,
            network_tx_bytes,
            disk_read_bytes,
            disk_write_bytes,
            uptime_seconds,
            running,
            cpu_pressure_some: None,
            cpu_pressure_full: None,
            memory_pressure_some: None,
            memory_pressure_full: None,
            io_pressure_some: None,
            io_pressure_full: None,
        }
    }
}

#[async_trait]
impl RuntimeReader for DockerReader {
    async fn ping(&self) -> Result<(), CollectError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| CollectError::RuntimeUnavailable(e.to_string()))
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, CollectError> {
        let options = Some(ListContainersOptions::<String> {
            all,
            ..Default::default()
        });

        let containers = self
            .docker
            .list_containers(options)
            .await
            .map_err(|e| CollectError::RuntimeUnavailable(e.to_string()))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                state: c.state.unwrap_or_else(|| "unknown".to_string()),
            })
            .collect())
    }

    async fn container_status(
        &self,
        container_id: &str,
    ) -> Result<ContainerStatus, CollectError> {
        let inspect = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(|e| Self::map_container_err(container_id, e))?;

        let status = inspect
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let (running, paused) = container_state_flags(&status);

        Ok(ContainerStatus {
            id: container_id.to_string(),
            name: inspect
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            status,
            running,
            paused,
        })
    }

    async fn snapshot(
        &self,
        container_id: &str,
    ) -> Result<ContainerMetricSnapshot, CollectError> {
        let inspect = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(|e| Self::map_container_err(container_id, e))?;

        let name = inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let status = inspect
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let (running, _paused) = container_state_flags(&status);
        let uptime = uptime_seconds(
            inspect
                .state
                .as_ref()
                .and_then(|s| s.started_at.as_deref()),
            Utc::now(),
        );

        let mut stream = self.docker.stats(
            container_id,
            Some(StatsOptions {
                stream: false,
                one_shot: true,
            }),
        );

        let stats = match stream.next().await {
            Some(Ok(stats)) => stats,
            Some(Err(e)) => return Err(Self::map_container_err(container_id, e)),
            None => return Err(CollectError::ContainerNotFound(container_id.to_string())),
        };

        Ok(self.snapshot_from_stats(container_id, name, running, uptime, &stats))
    }

    async fn control(
        &self,
        action: ControlAction,
        container_id: &str,
    ) -> Result<ControlOutcome, CollectError> {
        let result = match action {
            ControlAction::Start => {
                self.docker
                    .start_container(container_id, None::<StartContainerOptions<String>>)
                    .await
            }
            ControlAction::Stop => {
                self.docker
                    .stop_container(container_id, None::<StopContainerOptions>)
                    .await
            }
            ControlAction::Restart => {
                self.docker
                    .restart_container(container_id, None::<RestartContainerOptions>)
                    .await
            }
            ControlAction::Pause => self.docker.pause_container(container_id).await,
            ControlAction::Unpause => self.docker.unpause_container(container_id).await,
        };

        match result {
            Ok(()) => Ok(ControlOutcome::ok()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(CollectError::ContainerNotFound(container_id.to_string())),
            // Runtime-reported refusals ("already stopped", conflict states)
            // are outcomes, not errors.
            Err(bollard::errors::Error::DockerResponseServerError { message, .. }) => {
                Ok(ControlOutcome::failed(message))
            }
            Err(other) => Err(CollectError::RuntimeUnavailable(other.to_string())),
        }
    }

    async fn host_info(&self) -> Result<RuntimeHostInfo, CollectError> {
        let info = self
            .docker
            .info()
            .await
            .map_err(|e| CollectError::RuntimeUnavailable(e.to_string()))?;

        Ok(RuntimeHostInfo {
            name: info.name.unwrap_or_else(|| self.host_name.clone()),
            cpus: info.ncpu.unwrap_or(0).max(0) as u64,
            total_memory_bytes: info.mem_total.unwrap_or(0).max(0) as u64,
        })
    }
}

/// CPU percent from two cumulative counter pairs and the online core count.
///
/// Deterministic in its inputs; a non-positive system delta yields 0.0.
pub fn cpu_percent(
    cpu_total: u64,
    precpu_total: u64,
    system_total: u64,
    presystem_total: u64,
    online_cpus: u64,
) -> f64 {
    let cpu_delta = cpu_total.saturating_sub(precpu_total);
    let system_delta = system_total.saturating_sub(presystem_total);
    if system_delta == 0 {
        return 0.0;
    }
    cpu_delta as f64 / system_delta as f64 * online_cpus as f64 * 100.0
}

/// Sum block-I/O bytes across every device entry. Ops other than
/// read/write (sync, async, total) are ignored.
pub fn blkio_totals<'a>(entries: impl Iterator<Item = (&'a str, u64)>) -> (u64, u64) {
    entries.fold((0, 0), |(read, write), (op, value)| {
        if op.eq_ignore_ascii_case("read") {
            (read + value, write)
        } else if op.eq_ignore_ascii_case("write") {
            (read, write + value)
        } else {
            (read, write)
        }
    })
}

/// Map a raw runtime state string to `(running, paused)`.
/// Unknown and transitional states default to not running.
pub fn container_state_flags(state: &str) -> (bool, bool) {
    match state.to_ascii_lowercase().as_str() {
        "running" => (true, false),
        "paused" => (true, true),
        _ => (false, false),
    }
}

/// Uptime as `now - started_at`, zero for containers that never started.
/// Docker reports a zero-value timestamp (`0001-01-01T00:00:00Z`) for those.
pub fn uptime_seconds(started_at: Option<&str>, now: DateTime<Utc>) -> u64 {
    let Some(raw) = started_at else { return 0 };
    let Ok(started) = DateTime::parse_from_rfc3339(raw) else {
        return 0;
    };
    if started.year() <= 1 {
        return 0;
    }
    (now - started.with_timezone(&Utc)).num_seconds().max(0) as u64
}
