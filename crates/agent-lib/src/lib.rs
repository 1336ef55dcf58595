//! Agent library for container and host monitoring
//!
//! This crate provides the core functionality for:
//! - Metrics collection from the Docker runtime
//! - Pressure-stall (PSI) sampling from the cgroup filesystem
//! - Host-level metrics from /proc
//! - A bounded in-memory metrics store
//! - Host health tracking and the host registry

pub mod collector;
pub mod error;
pub mod health;
pub mod hoststats;
pub mod models;
pub mod observability;
pub mod pressure;
pub mod registry;
pub mod runtime;
pub mod store;

pub use collector::{CollectionConfig, CollectionLoop, CollectionLoopBuilder};
pub use error::CollectError;
pub use health::{HostHealth, HostHealthTracker};
pub use models::*;
pub use observability::AgentMetrics;
pub use registry::HostRegistry;
pub use store::{MetricsFilter, MetricsStore, StoreStats};
