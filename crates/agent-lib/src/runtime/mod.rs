//! Container runtime access
//!
//! `RuntimeReader` is the seam between the collection loop / control surface
//! and the actual container runtime, so both can be exercised against mocks.
//! `DockerReader` is the bollard-backed implementation.

mod docker;

pub use docker::DockerReader;

use crate::error::CollectError;
use crate::models::{
    ContainerMetricSnapshot, ContainerStatus, ContainerSummary, ControlAction, ControlOutcome,
    HostConfig, RuntimeHostInfo,
};
use dashmap::DashMap;
use std::sync::Arc;

pub use async_trait::async_trait;

/// Read and control operations against one container runtime endpoint.
#[async_trait]
pub trait RuntimeReader: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), CollectError>;

    /// Enumerate containers, optionally including stopped ones.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, CollectError>;

    /// Real-time state of one container.
    async fn container_status(&self, container_id: &str)
        -> Result<ContainerStatus, CollectError>;

    /// One typed metrics snapshot for a container, or a typed failure.
    async fn snapshot(&self, container_id: &str)
        -> Result<ContainerMetricSnapshot, CollectError>;

    /// Invoke a lifecycle action. Runtime-reported failures come back as
    /// `ControlOutcome { success: false, .. }`, not as an `Err`.
    async fn control(
        &self,
        action: ControlAction,
        container_id: &str,
    ) -> Result<ControlOutcome, CollectError>;

    /// The runtime's view of its host.
    async fn host_info(&self) -> Result<RuntimeHostInfo, CollectError>;
}

/// Resolves a reader for a configured host.
#[async_trait]
pub trait ReaderProvider: Send + Sync {
    async fn reader_for(&self, host: &HostConfig) -> Result<Arc<dyn RuntimeReader>, CollectError>;
}

/// Caches one Docker client per host id so control actions and the
/// collection loop share connections.
#[derive(Default)]
pub struct DockerReaderProvider {
    readers: DashMap<String, Arc<DockerReader>>,
}

impl DockerReaderProvider {
    pub fn new() -> Self {
        Self {
            readers: DashMap::new(),
        }
    }
}

#[async_trait]
impl ReaderProvider for DockerReaderProvider {
    async fn reader_for(&self, host: &HostConfig) -> Result<Arc<dyn RuntimeReader>, CollectError> {
        if let Some(reader) = self.readers.get(&host.id) {
            return Ok(reader.clone() as Arc<dyn RuntimeReader>);
        }

        let reader = Arc::new(match &host.url {
            Some(url) => DockerReader::connect_http(url, &host.id, &host.name)?,
            None => DockerReader::connect_local(&host.id, &host.name)?,
        });
        self.readers.insert(host.id.clone(), reader.clone());
        Ok(reader as Arc<dyn RuntimeReader>)
    }
}
