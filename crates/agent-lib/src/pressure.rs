//! Pressure-stall information reader
//!
//! Probes the cgroup filesystem for a container's `cpu.pressure`,
//! `memory.pressure`, and `io.pressure` files. Which layout the kernel
//! exposes (if any) is decided on the first read and cached for the process
//! lifetime: pressure support does not change while a container runs, so
//! re-probing every tick would only burn syscalls.
//!
//! Absence is never an error. Missing files, permission problems, and
//! malformed lines all degrade the affected resource to `None`.

use crate::models::{PressureSample, ResourcePressure};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use tokio::fs;
use tracing::debug;

const PRESSURE_FILES: [&str; 3] = ["cpu.pressure", "memory.pressure", "io.pressure"];

/// Where a container's pressure files live, in probe priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressureSource {
    /// systemd layout: `system.slice/docker-<id>.scope`
    Scope,
    /// flat cgroupfs layout: `docker/<id>`
    Flat,
    /// root cgroup as a last resort (host-wide readings)
    Root,
    /// no layout qualified; cached for the process lifetime
    Unsupported,
}

/// Reads pressure metrics for containers from a cgroup root.
pub struct PressureReader {
    cgroup_root: PathBuf,
    source: OnceLock<PressureSource>,
    probe_count: AtomicUsize,
}

impl PressureReader {
    pub fn new(cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
            source: OnceLock::new(),
            probe_count: AtomicUsize::new(0),
        }
    }

    /// Read pressure metrics for a container, or an all-`None` sample when
    /// the capability is unsupported or the container's cgroup is gone.
    pub async fn read(&self, container_id: &str) -> PressureSample {
        let source = match self.source.get() {
            Some(source) => *source,
            None => {
                let probed = self.probe(container_id).await;
                *self.source.get_or_init(|| probed)
            }
        };

        let dir = match self.dir_for(source, container_id) {
            Some(dir) => dir,
            None => return PressureSample::default(),
        };

        PressureSample {
            cpu: self.read_resource(&dir, "cpu.pressure").await,
            memory: self.read_resource(&dir, "memory.pressure").await,
            io: self.read_resource(&dir, "io.pressure").await,
        }
    }

    /// How many filesystem probes have run. Stays at one for the process
    /// lifetime once the layout decision is cached.
    pub fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }

    async fn probe(&self, container_id: &str) -> PressureSource {
        self.probe_count.fetch_add(1, Ordering::SeqCst);

        let candidates = [
            (PressureSource::Scope, self.scope_dir(container_id)),
            (PressureSource::Flat, self.flat_dir(container_id)),
            (PressureSource::Root, self.cgroup_root.clone()),
        ];

        for (source, dir) in candidates {
            if Self::has_pressure_files(&dir).await {
                debug!(dir = %dir.display(), "Pressure files located");
                return source;
            }
        }

        debug!(root = %self.cgroup_root.display(), "Pressure-stall information unsupported");
        PressureSource::Unsupported
    }

    async fn has_pressure_files(dir: &Path) -> bool {
        for file in PRESSURE_FILES {
            if fs::metadata(dir.join(file)).await.is_err() {
                return false;
            }
        }
        true
    }

    fn dir_for(&self, source: PressureSource, container_id: &str) -> Option<PathBuf> {
        match source {
            PressureSource::Scope => Some(self.scope_dir(container_id)),
            PressureSource::Flat => Some(self.flat_dir(container_id)),
            PressureSource::Root => Some(self.cgroup_root.clone()),
            PressureSource::Unsupported => None,
        }
    }

    fn scope_dir(&self, container_id: &str) -> PathBuf {
        self.cgroup_root
            .join("system.slice")
            .join(format!("docker-{container_id}.scope"))
    }

    fn flat_dir(&self, container_id: &str) -> PathBuf {
        self.cgroup_root.join("docker").join(container_id)
    }

    async fn read_resource(&self, dir: &Path, file: &str) -> Option<ResourcePressure> {
        let content = fs::read_to_string(dir.join(file)).await.ok()?;
        parse_pressure_file(&content)
    }
}

/// Parse one pressure file.
///
/// Expected shape, two lines with three averages each:
/// ```text
/// some avg10=1.23 avg60=0.50 avg300=0.10 total=12345
/// full avg10=0.45 avg60=0.20 avg300=0.05 total=6789
/// ```
/// Only the avg10 pair is surfaced. Anything malformed yields `None`.
pub fn parse_pressure_file(content: &str) -> Option<ResourcePressure> {
    let mut some_avg10 = None;
    let mut full_avg10 = None;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("some") => some_avg10 = extract_avg10(fields),
            Some("full") => full_avg10 = extract_avg10(fields),
            _ => {}
        }
    }

    Some(ResourcePressure {
        some_avg10: some_avg10?,
        full_avg10: full_avg10?,
    })
}

fn extract_avg10<'a>(mut fields: impl Iterator<Item = &'a str>) -> Option<f64> {
    fields
        .find_map(|f| f.strip_prefix("avg10="))
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    const VALID_CPU: &str = "some avg10=1.50 avg60=0.80 avg300=0.20 total=123456\n\
                             full avg10=0.30 avg60=0.10 avg300=0.02 total=45678\n";
    const VALID_MEM: &str = "some avg10=2.00 avg60=1.00 avg300=0.50 total=222\n\
                             full avg10=1.00 avg60=0.40 avg300=0.10 total=111\n";
    const VALID_IO: &str = "some avg10=0.00 avg60=0.00 avg300=0.00 total=0\n\
                            full avg10=0.00 avg60=0.00 avg300=0.00 total=0\n";

    fn write_pressure_dir(dir: &Path, cpu: &str, memory: &str, io: &str) {
        std_fs::create_dir_all(dir).unwrap();
        std_fs::write(dir.join("cpu.pressure"), cpu).unwrap();
        std_fs::write(dir.join("memory.pressure"), memory).unwrap();
        std_fs::write(dir.join("io.pressure"), io).unwrap();
    }

    #[test]
    fn parse_valid_pressure_file() {
        let parsed = parse_pressure_file(VALID_CPU).unwrap();
        assert_eq!(parsed.some_avg10, 1.5);
        assert_eq!(parsed.full_avg10, 0.3);
    }

    #[test]
    fn parse_zero_readings_are_valid() {
        // Measured zero is a reading, not absence.
        let parsed = parse_pressure_file(VALID_IO).unwrap();
        assert_eq!(parsed.some_avg10, 0.0);
        assert_eq!(parsed.full_avg10, 0.0);
    }

    #[test]
    fn parse_rejects_malformed_content() {
        assert!(parse_pressure_file("").is_none());
        assert!(parse_pressure_file("garbage\n").is_none());
        assert!(parse_pressure_file("some avg10=nope avg60=0 avg300=0\nfull avg10=0.1\n").is_none());
        // Missing full line.
        assert!(parse_pressure_file("some avg10=1.0 avg60=0.5 avg300=0.1 total=5\n").is_none());
    }

    #[tokio::test]
    async fn reads_from_flat_layout() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("docker").join("abc123");
        write_pressure_dir(&dir, VALID_CPU, VALID_MEM, VALID_IO);

        let reader = PressureReader::new(root.path());
        let sample = reader.read("abc123").await;

        assert_eq!(sample.cpu.unwrap().some_avg10, 1.5);
        assert_eq!(sample.memory.unwrap().full_avg10, 1.0);
        assert_eq!(sample.io.unwrap().some_avg10, 0.0);
    }

    #[tokio::test]
    async fn scope_layout_wins_over_flat() {
        let root = TempDir::new().unwrap();
        let scope = root
            .path()
            .join("system.slice")
            .join("docker-abc123.scope");
        write_pressure_dir(&scope, VALID_CPU, VALID_MEM, VALID_IO);
        let flat = root.path().join("docker").join("abc123");
        write_pressure_dir(&flat, VALID_IO, VALID_IO, VALID_IO);

        let reader = PressureReader::new(root.path());
        let sample = reader.read("abc123").await;

        // Values from the scope directory, not the flat one.
        assert_eq!(sample.cpu.unwrap().some_avg10, 1.5);
    }

    #[tokio::test]
    async fn malformed_resource_degrades_only_itself() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("docker").join("abc123");
        write_pressure_dir(&dir, VALID_CPU, "not a pressure file", VALID_IO);

        let reader = PressureReader::new(root.path());
        let sample = reader.read("abc123").await;

        assert!(sample.cpu.is_some());
        assert!(sample.memory.is_none());
        assert!(sample.io.is_some());
    }

    #[tokio::test]
    async fn unsupported_is_cached_and_never_reprobed() {
        let root = TempDir::new().unwrap();
        let reader = PressureReader::new(root.path());

        let sample = reader.read("abc123").await;
        assert_eq!(sample, PressureSample::default());
        assert_eq!(reader.probe_count(), 1);

        // Repeated reads must not touch the filesystem again for probing,
        // even if pressure files appear later in the process lifetime.
        let dir = root.path().join("docker").join("abc123");
        write_pressure_dir(&dir, VALID_CPU, VALID_MEM, VALID_IO);

        for _ in 0..5 {
            let sample = reader.read("abc123").await;
            assert_eq!(sample, PressureSample::default());
        }
        assert_eq!(reader.probe_count(), 1);
    }

    #[tokio::test]
    async fn vanished_container_reads_as_absent() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("docker").join("abc123");
        write_pressure_dir(&dir, VALID_CPU, VALID_MEM, VALID_IO);

        let reader = PressureReader::new(root.path());
        assert!(reader.read("abc123").await.cpu.is_some());

        // Another container without a cgroup directory: degrade, don't fail.
        let sample = reader.read("gone456").await;
        assert_eq!(sample, PressureSample::default());
        assert_eq!(reader.probe_count(), 1);
    }
}
