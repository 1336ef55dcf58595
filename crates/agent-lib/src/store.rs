//! In-memory, retention-bounded metrics store
//!
//! Snapshots live in an arena of per-series vectors, each behind its own
//! `RwLock`, so a slow reader or writer on one container never blocks
//! another. Series keys come and go with containers; trim evicts series
//! that end up empty so the key space stays bounded.

use crate::models::{ContainerMetricSnapshot, HostMetricSnapshot};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::RwLock;

/// Default query window when the caller gives no time range.
const DEFAULT_WINDOW_HOURS: i64 = 6;

/// Series key for container metrics: one series per container per host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub host_id: String,
    pub container_id: String,
}

/// Filter for store queries.
///
/// Absent id sets match everything; an unknown id simply matches nothing.
/// The time range is inclusive and defaults to the last six hours.
#[derive(Debug, Clone, Default)]
pub struct MetricsFilter {
    pub container_ids: Option<Vec<String>>,
    pub host_ids: Option<Vec<String>>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Return at most the newest in-range point per series.
    pub latest: bool,
    /// Cap points per series, most recent first.
    pub limit: Option<usize>,
}

impl MetricsFilter {
    fn range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let to = self.to.unwrap_or(now);
        // The default window is anchored to now, not to `to`.
        let from = self
            .from
            .unwrap_or_else(|| now - Duration::hours(DEFAULT_WINDOW_HOURS));
        (from, to)
    }

    fn matches_container(&self, key: &SeriesKey) -> bool {
        let id_ok = self
            .container_ids
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| id == &key.container_id));
        let host_ok = self
            .host_ids
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| id == &key.host_id));
        id_ok && host_ok
    }

    fn matches_host(&self, host_id: &str) -> bool {
        self.host_ids
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| id == host_id))
    }
}

/// Store-level counts for the diagnostics endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub series_count: usize,
    pub total_points: usize,
}

/// Thread-safe time-series cache for container and host snapshots.
///
/// Created once at process start and passed explicitly to the collection
/// loop and request handlers. Volatile by design: nothing is flushed on
/// shutdown.
pub struct MetricsStore {
    containers: DashMap<SeriesKey, RwLock<Vec<ContainerMetricSnapshot>>>,
    hosts: DashMap<String, RwLock<Vec<HostMetricSnapshot>>>,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            containers: DashMap::new(),
            hosts: DashMap::new(),
        }
    }

    /// Append a container snapshot to its series.
    pub fn append_container(&self, snapshot: ContainerMetricSnapshot) {
        let key = SeriesKey {
            host_id: snapshot.host_id.clone(),
            container_id: snapshot.container_id.clone(),
        };
        let series = self.containers.entry(key).or_insert_with(|| RwLock::new(Vec::new()));
        series.write().expect("series lock poisoned").push(snapshot);
    }

    /// Append a host snapshot to its series.
    pub fn append_host(&self, snapshot: HostMetricSnapshot) {
        let series = self
            .hosts
            .entry(snapshot.host_id.clone())
            .or_insert_with(|| RwLock::new(Vec::new()));
        series.write().expect("series lock poisoned").push(snapshot);
    }

    /// Query container snapshots.
    ///
    /// Points within a series are insertion-ordered (chronological for a
    /// single collection loop). `latest` returns the newest in-range point
    /// per series; `limit` returns the most recent N per series in
    /// descending timestamp order.
    pub fn query_containers(&self, filter: &MetricsFilter) -> Vec<ContainerMetricSnapshot> {
        let (from, to) = filter.range(Utc::now());
        let mut out = Vec::new();

        for entry in self.containers.iter() {
            if !filter.matches_container(entry.key()) {
                continue;
            }
            let series = entry.value().read().expect("series lock poisoned");
            Self::select_points(&series, from, to, filter, &mut out, |s| s.timestamp);
        }

        out
    }

    /// Query host snapshots with the same range semantics.
    pub fn query_hosts(&self, filter: &MetricsFilter) -> Vec<HostMetricSnapshot> {
        let (from, to) = filter.range(Utc::now());
        let mut out = Vec::new();

        for entry in self.hosts.iter() {
            if !filter.matches_host(entry.key()) {
                continue;
            }
            let series = entry.value().read().expect("series lock poisoned");
            Self::select_points(&series, from, to, filter, &mut out, |s| s.timestamp);
        }

        out
    }

    fn select_points<T: Clone>(
        series: &[T],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: &MetricsFilter,
        out: &mut Vec<T>,
        ts: impl Fn(&T) -> DateTime<Utc>,
    ) {
        let in_range = |point: &&T| {
            let t = ts(point);
            t >= from && t <= to
        };

        if filter.latest {
            // Series are chronological, so the last in-range point is the
            // newest within the window, even when newer points fall outside.
            if let Some(point) = series.iter().rev().find(|p| in_range(p)) {
                out.push(point.clone());
            }
        } else if let Some(limit) = filter.limit {
            out.extend(series.iter().rev().filter(in_range).take(limit).cloned());
        } else {
            out.extend(series.iter().filter(|p| in_range(p)).cloned());
        }
    }

    /// Drop points older than the retention horizon and evict series that
    /// end up empty. Safe to run concurrently with appends and queries.
    pub fn trim(&self, retention: Duration) {
        let cutoff = Utc::now() - retention;

        let mut empty_containers = Vec::new();
        for entry in self.containers.iter() {
            let mut series = entry.value().write().expect("series lock poisoned");
            series.retain(|s| s.timestamp >= cutoff);
            if series.is_empty() {
                empty_containers.push(entry.key().clone());
            }
        }
        for key in empty_containers {
            // Re-check emptiness under the entry lock so a concurrent append
            // between the scan and the removal is never lost.
            self.containers
                .remove_if(&key, |_, v| v.read().expect("series lock poisoned").is_empty());
        }

        let mut empty_hosts = Vec::new();
        for entry in self.hosts.iter() {
            let mut series = entry.value().write().expect("series lock poisoned");
            series.retain(|s| s.timestamp >= cutoff);
            if series.is_empty() {
                empty_hosts.push(entry.key().clone());
            }
        }
        for key in empty_hosts {
            self.hosts
                .remove_if(&key, |_, v| v.read().expect("series lock poisoned").is_empty());
        }
    }

    /// Series and point counts across both container and host series.
    pub fn stats(&self) -> StoreStats {
        let mut total_points = 0;
        for entry in self.containers.iter() {
            total_points += entry.value().read().expect("series lock poisoned").len();
        }
        for entry in self.hosts.iter() {
            total_points += entry.value().read().expect("series lock poisoned").len();
        }
        StoreStats {
            series_count: self.containers.len() + self.hosts.len(),
            total_points,
        }
    }

    /// Distinct container ids currently held in the store.
    pub fn known_container_ids(&self) -> Vec<String> {
        let ids: HashSet<String> = self
            .containers
            .iter()
            .map(|entry| entry.key().container_id.clone())
            .collect();
        ids.into_iter().collect()
    }

    /// Number of distinct containers stored for one host.
    pub fn container_count_for_host(&self, host_id: &str) -> usize {
        self.containers
            .iter()
            .filter(|entry| entry.key().host_id == host_id)
            .count()
    }
}
