//! Prometheus metrics for the agent itself
//!
//! Counters and gauges describing the collection loop, exposed at
//! `/metrics` by the HTTP surface.

use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};
use std::sync::OnceLock;

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    collection_cycles: IntCounter,
    collection_errors: IntCounter,
    snapshots_collected: IntCounter,
    containers_monitored: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            collection_cycles: register_int_counter!(
                "dockmon_collection_cycles_total",
                "Total number of collection cycles run"
            )
            .expect("Failed to register collection_cycles_total"),

            collection_errors: register_int_counter!(
                "dockmon_collection_errors_total",
                "Total number of failed host polls"
            )
            .expect("Failed to register collection_errors_total"),

            snapshots_collected: register_int_counter!(
                "dockmon_snapshots_collected_total",
                "Total number of container snapshots appended to the store"
            )
            .expect("Failed to register snapshots_collected_total"),

            containers_monitored: register_int_gauge!(
                "dockmon_containers_monitored",
                "Number of containers sampled in the last collection cycle"
            )
            .expect("Failed to register containers_monitored"),
        }
    }
}

/// Lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &'static AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn inc_cycle(&self) {
        self.inner().collection_cycles.inc();
    }

    pub fn inc_error(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn inc_snapshot(&self) {
        self.inner().snapshots_collected.inc();
    }

    pub fn set_containers_monitored(&self, count: i64) {
        self.inner().containers_monitored.set(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_one_registry() {
        let a = AgentMetrics::new();
        let b = a.clone();

        a.inc_cycle();
        b.inc_cycle();
        a.set_containers_monitored(7);

        let inner = a.inner();
        assert!(inner.collection_cycles.get() >= 2);
        assert_eq!(inner.containers_monitored.get(), 7);
    }
}
