//! Typed failure taxonomy for collection and control paths
//!
//! Leaf-reader failures never abort the collection loop: `RuntimeUnavailable`
//! is fatal to one poll of one host, `ContainerNotFound` skips one container
//! for one tick, and `HostNotFound` maps to a client-error response.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    /// The container runtime could not be reached (connection refused,
    /// timeout, socket missing).
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The container vanished between enumeration and the stat fetch.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// No host with this id exists in the registry.
    #[error("host not found: {0}")]
    HostNotFound(String),
}

impl CollectError {
    /// True when the failure means this container should be skipped for the
    /// current tick rather than failing the host poll.
    pub fn is_skippable(&self) -> bool {
        matches!(self, CollectError::ContainerNotFound(_))
    }
}
