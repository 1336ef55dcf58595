//! Per-host health tracking for multi-host aggregation
//!
//! The collection loop records one success or failure per host per tick;
//! status queries read the resulting map. Writes are serialized per host by
//! the loop itself, so last-writer-wins per entry is sufficient.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health state of one host.
///
/// A host starts `Unknown` (absent from the map), becomes `Healthy` on its
/// first successful poll, and afterwards toggles between healthy and
/// unhealthy. It never returns to `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostHealth {
    pub last_checked: DateTime<Utc>,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Tracks reachability and error state per host id.
#[derive(Debug, Default)]
pub struct HostHealthTracker {
    hosts: DashMap<String, HostHealth>,
}

impl HostHealthTracker {
    pub fn new() -> Self {
        Self {
            hosts: DashMap::new(),
        }
    }

    /// Record a successful poll of a host.
    pub fn record_success(&self, host_id: &str) {
        self.hosts.insert(
            host_id.to_string(),
            HostHealth {
                last_checked: Utc::now(),
                healthy: true,
                last_error: None,
            },
        );
    }

    /// Record a failed poll of a host with the error detail.
    pub fn record_failure(&self, host_id: &str, error: impl Into<String>) {
        self.hosts.insert(
            host_id.to_string(),
            HostHealth {
                last_checked: Utc::now(),
                healthy: false,
                last_error: Some(error.into()),
            },
        );
    }

    /// Health state of one host, or `None` while it is still unknown.
    pub fn get(&self, host_id: &str) -> Option<HostHealth> {
        self.hosts.get(host_id).map(|entry| entry.clone())
    }

    /// Snapshot of every tracked host.
    pub fn get_all(&self) -> HashMap<String, HostHealth> {
        self.hosts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// True when every tracked host is currently healthy. An empty tracker
    /// counts as healthy: nothing has failed yet.
    pub fn all_healthy(&self) -> bool {
        self.hosts.iter().all(|entry| entry.value().healthy)
    }
}
