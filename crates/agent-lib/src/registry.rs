//! Host registry
//!
//! CRUD list of operator-supplied host endpoints. Seeded at startup from
//! configuration; not persisted.

use crate::models::HostConfig;
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::path::Path;

/// Registry of configured hosts, keyed by host id.
#[derive(Debug, Default)]
pub struct HostRegistry {
    hosts: DashMap<String, HostConfig>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self {
            hosts: DashMap::new(),
        }
    }

    /// Insert or replace a host.
    pub fn upsert(&self, host: HostConfig) {
        self.hosts.insert(host.id.clone(), host);
    }

    /// Remove a host. Historical snapshots for it survive until the next
    /// trim cycle; the store holds no ownership link back to the registry.
    pub fn remove(&self, host_id: &str) -> Option<HostConfig> {
        self.hosts.remove(host_id).map(|(_, v)| v)
    }

    pub fn get(&self, host_id: &str) -> Option<HostConfig> {
        self.hosts.get(host_id).map(|entry| entry.clone())
    }

    pub fn list(&self) -> Vec<HostConfig> {
        let mut hosts: Vec<_> = self.hosts.iter().map(|e| e.value().clone()).collect();
        hosts.sort_by(|a, b| a.id.cmp(&b.id));
        hosts
    }

    /// Hosts the collection loop should poll.
    pub fn list_enabled(&self) -> Vec<HostConfig> {
        self.list().into_iter().filter(|h| h.enabled).collect()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Load additional hosts from a JSON file containing `[HostConfig]`.
    pub fn load_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read host file {}", path.display()))?;
        let hosts: Vec<HostConfig> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse host file {}", path.display()))?;

        let count = hosts.len();
        for host in hosts {
            self.upsert(host);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn host(id: &str, enabled: bool) -> HostConfig {
        HostConfig {
            id: id.to_string(),
            name: id.to_string(),
            url: Some(format!("http://{id}:2375")),
            enabled,
        }
    }

    #[test]
    fn upsert_get_remove() {
        let registry = HostRegistry::new();
        registry.upsert(host("h1", true));

        assert_eq!(registry.get("h1").unwrap().id, "h1");
        assert_eq!(registry.len(), 1);

        registry.upsert(HostConfig {
            name: "renamed".to_string(),
            ..host("h1", true)
        });
        assert_eq!(registry.get("h1").unwrap().name, "renamed");
        assert_eq!(registry.len(), 1);

        assert!(registry.remove("h1").is_some());
        assert!(registry.get("h1").is_none());
    }

    #[test]
    fn list_enabled_filters_disabled_hosts() {
        let registry = HostRegistry::new();
        registry.upsert(host("h1", true));
        registry.upsert(host("h2", false));
        registry.upsert(host("h3", true));

        let enabled = registry.list_enabled();
        assert_eq!(enabled.len(), 2);
        assert!(enabled.iter().all(|h| h.enabled));
    }

    #[test]
    fn load_file_parses_host_list() {
        let registry = HostRegistry::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "edge-1", "name": "Edge One", "url": "http://edge-1:2375"}}]"#
        )
        .unwrap();

        let count = registry.load_file(file.path()).unwrap();
        assert_eq!(count, 1);

        let loaded = registry.get("edge-1").unwrap();
        assert_eq!(loaded.name, "Edge One");
        // `enabled` defaults to true when the file omits it.
        assert!(loaded.enabled);
    }
}
