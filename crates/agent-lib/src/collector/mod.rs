//! Periodic metrics collection
//!
//! The collection loop drives polling across all enabled hosts, appending
//! snapshots to the metrics store and recording per-host health.

mod r#loop;

pub use r#loop::{CollectionConfig, CollectionLoop, CollectionLoopBuilder};
