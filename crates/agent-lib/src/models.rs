//! Core data models for the monitoring agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable measurement of a container's resource usage.
///
/// A new poll tick always produces a new snapshot; existing snapshots are
/// never mutated. The six pressure fields serialize as explicit `null` when
/// the kernel does not expose pressure-stall information, so "unsupported"
/// stays distinguishable from "measured zero".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMetricSnapshot {
    pub host_id: String,
    pub host_name: String,
    pub container_id: String,
    pub container_name: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub memory_percent: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub uptime_seconds: u64,
    pub running: bool,
    pub cpu_pressure_some: Option<f64>,
    pub cpu_pressure_full: Option<f64>,
    pub memory_pressure_some: Option<f64>,
    pub memory_pressure_full: Option<f64>,
    pub io_pressure_some: Option<f64>,
    pub io_pressure_full: Option<f64>,
}

impl ContainerMetricSnapshot {
    /// Copy a pressure sample into the snapshot's optional fields.
    pub fn with_pressure(mut self, sample: &PressureSample) -> Self {
        self.cpu_pressure_some = sample.cpu.as_ref().map(|p| p.some_avg10);
        self.cpu_pressure_full = sample.cpu.as_ref().map(|p| p.full_avg10);
        self.memory_pressure_some = sample.memory.as_ref().map(|p| p.some_avg10);
        self.memory_pressure_full = sample.memory.as_ref().map(|p| p.full_avg10);
        self.io_pressure_some = sample.io.as_ref().map(|p| p.some_avg10);
        self.io_pressure_full = sample.io.as_ref().map(|p| p.full_avg10);
        self
    }
}

/// One immutable measurement of a host's resource usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMetricSnapshot {
    pub host_id: String,
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub cpu_frequency_mhz: f64,
    pub memory_bytes: u64,
    pub memory_percent: f64,
    pub uptime_seconds: u64,
    pub up: bool,
}

impl HostMetricSnapshot {
    /// Down marker for a host whose poll failed this tick. Resource fields
    /// are zero; `up: false` is the signal.
    pub fn down(host_id: &str, hostname: &str) -> Self {
        Self {
            host_id: host_id.to_string(),
            hostname: hostname.to_string(),
            timestamp: Utc::now(),
            cpu_percent: 0.0,
            cpu_frequency_mhz: 0.0,
            memory_bytes: 0,
            memory_percent: 0.0,
            uptime_seconds: 0,
            up: false,
        }
    }
}

/// Pressure-stall percentages for a single resource (avg10 window).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourcePressure {
    pub some_avg10: f64,
    pub full_avg10: f64,
}

/// Pressure readings across CPU, memory, and I/O.
///
/// A `None` resource means the kernel interface was unreadable or malformed
/// for that resource. Absence is a state, not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PressureSample {
    pub cpu: Option<ResourcePressure>,
    pub memory: Option<ResourcePressure>,
    pub io: Option<ResourcePressure>,
}

/// Operator-supplied host identity and endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    pub id: String,
    pub name: String,
    /// Docker endpoint URL; `None` means the local unix socket.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Read-time join of a host's config, health state, and container count.
///
/// Derived fields are recomputed on every request and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub enabled: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub healthy: bool,
    pub last_error: Option<String>,
    pub container_count: usize,
    /// The runtime's view of the host; absent while it is unreachable.
    pub cpus: Option<u64>,
    pub total_memory_bytes: Option<u64>,
}

/// Container identity for enumeration responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: String,
}

/// Real-time container state as reported by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub id: String,
    pub name: String,
    pub status: String,
    pub running: bool,
    pub paused: bool,
}

/// Container lifecycle actions the control surface can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
}

impl ControlAction {
    /// Parse an action from its URL path segment.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "restart" => Some(Self::Restart),
            "pause" => Some(Self::Pause),
            "unpause" => Some(Self::Unpause),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
        }
    }
}

/// Result of a control action.
///
/// Runtime-reported failures ("container already stopped") surface here as
/// `success = false` with the runtime's message, never as an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// The runtime's view of the host it runs on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeHostInfo {
    pub name: String,
    pub cpus: u64,
    pub total_memory_bytes: u64,
}
