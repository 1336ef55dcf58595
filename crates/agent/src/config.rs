//! Agent configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Agent configuration, sourced from `DOCKMON_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Identifier of the host this agent runs on
    #[serde(default = "default_host_id")]
    pub host_id: String,

    /// Display name of the local host
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Metrics collection interval in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Store trim interval in seconds
    #[serde(default = "default_trim_interval")]
    pub trim_interval_secs: u64,

    /// Retention horizon in hours
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Root of the cgroup2 filesystem for pressure readings
    #[serde(default = "default_cgroup_root")]
    pub cgroup_root: PathBuf,

    /// Optional JSON file with additional Docker hosts to monitor
    #[serde(default)]
    pub hosts_file: Option<PathBuf>,
}

fn default_host_id() -> String {
    "local".to_string()
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_collection_interval() -> u64 {
    10
}

fn default_trim_interval() -> u64 {
    300
}

fn default_retention_hours() -> u64 {
    6
}

fn default_cgroup_root() -> PathBuf {
    PathBuf::from("/sys/fs/cgroup")
}

impl AgentConfig {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("DOCKMON"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| AgentConfig {
            host_id: default_host_id(),
            host_name: default_host_name(),
            api_port: default_api_port(),
            collection_interval_secs: default_collection_interval(),
            trim_interval_secs: default_trim_interval(),
            retention_hours: default_retention_hours(),
            cgroup_root: default_cgroup_root(),
            hosts_file: None,
        }))
    }
}
