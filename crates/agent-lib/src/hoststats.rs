//! Local host resource snapshots from procfs
//!
//! Reads `/proc/stat`, `/proc/meminfo`, `/proc/uptime`, and `/proc/cpuinfo`.
//! CPU percent needs two samples of the cumulative counters, so the reader
//! keeps the previous sample and reports 0.0 on the first tick.

use crate::models::HostMetricSnapshot;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs;

/// Collects one `HostMetricSnapshot` per tick for the local host.
pub struct HostStatsReader {
    proc_root: PathBuf,
    /// Previous (busy, total) jiffy counters from /proc/stat.
    prev_cpu: Mutex<Option<(u64, u64)>>,
}

impl HostStatsReader {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Custom proc root for testing.
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            prev_cpu: Mutex::new(None),
        }
    }

    /// Take one host snapshot. Individual missing files degrade the
    /// affected field to zero rather than failing the tick.
    pub async fn read_snapshot(&self, host_id: &str, hostname: &str) -> Result<HostMetricSnapshot> {
        let stat = fs::read_to_string(self.proc_root.join("stat"))
            .await
            .context("failed to read /proc/stat")?;
        let (busy, total) =
            parse_proc_stat_cpu(&stat).context("failed to parse cpu line in /proc/stat")?;

        let cpu_percent = {
            let mut prev = self.prev_cpu.lock().expect("cpu sample lock poisoned");
            let percent = match *prev {
                Some((prev_busy, prev_total)) => {
                    cpu_percent_from_jiffies(busy, prev_busy, total, prev_total)
                }
                None => 0.0,
            };
            *prev = Some((busy, total));
            percent
        };

        let meminfo = fs::read_to_string(self.proc_root.join("meminfo"))
            .await
            .unwrap_or_default();
        let (memory_bytes, memory_percent) = parse_meminfo(&meminfo)
            .map(|(total_kb, available_kb)| {
                let used_kb = total_kb.saturating_sub(available_kb);
                let percent = if total_kb > 0 {
                    used_kb as f64 / total_kb as f64 * 100.0
                } else {
                    0.0
                };
                (used_kb * 1024, percent)
            })
            .unwrap_or((0, 0.0));

        let uptime_seconds = fs::read_to_string(self.proc_root.join("uptime"))
            .await
            .ok()
            .and_then(|content| parse_uptime(&content))
            .unwrap_or(0);

        let cpu_frequency_mhz = fs::read_to_string(self.proc_root.join("cpuinfo"))
            .await
            .ok()
            .and_then(|content| parse_cpuinfo_mhz(&content))
            .unwrap_or(0.0);

        Ok(HostMetricSnapshot {
            host_id: host_id.to_string(),
            hostname: hostname.to_string(),
            timestamp: Utc::now(),
            cpu_percent,
            cpu_frequency_mhz,
            memory_bytes,
            memory_percent,
            uptime_seconds,
            up: true,
        })
    }
}

impl Default for HostStatsReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the aggregate `cpu` line of /proc/stat into (busy, total) jiffies.
pub fn parse_proc_stat_cpu(content: &str) -> Option<(u64, u64)> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 5 {
        return None;
    }

    let total: u64 = fields.iter().sum();
    // idle + iowait count as non-busy time.
    let idle = fields[3] + fields[4];
    Some((total.saturating_sub(idle), total))
}

/// Percent busy between two cumulative jiffy samples.
pub fn cpu_percent_from_jiffies(busy: u64, prev_busy: u64, total: u64, prev_total: u64) -> f64 {
    let busy_delta = busy.saturating_sub(prev_busy);
    let total_delta = total.saturating_sub(prev_total);
    if total_delta == 0 {
        return 0.0;
    }
    busy_delta as f64 / total_delta as f64 * 100.0
}

/// Extract (MemTotal, MemAvailable) in kB from /proc/meminfo.
pub fn parse_meminfo(content: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("MemTotal:") => total = fields.next().and_then(|v| v.parse().ok()),
            Some("MemAvailable:") => available = fields.next().and_then(|v| v.parse().ok()),
            _ => {}
        }
        if total.is_some() && available.is_some() {
            break;
        }
    }

    Some((total?, available?))
}

/// First field of /proc/uptime, truncated to whole seconds.
pub fn parse_uptime(content: &str) -> Option<u64> {
    content
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .map(|secs| secs as u64)
}

/// First `cpu MHz` entry of /proc/cpuinfo.
pub fn parse_cpuinfo_mhz(content: &str) -> Option<f64> {
    content
        .lines()
        .find(|l| l.starts_with("cpu MHz"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    const STAT_T0: &str = "cpu  1000 50 300 8000 200 0 25 0 0 0\ncpu0 500 25 150 4000 100 0 12 0 0 0\n";
    const STAT_T1: &str = "cpu  1200 50 400 8500 200 0 25 0 0 0\ncpu0 600 25 200 4250 100 0 12 0 0 0\n";
    const MEMINFO: &str = "MemTotal:       16384000 kB\nMemFree:         2048000 kB\nMemAvailable:    8192000 kB\n";
    const CPUINFO: &str = "processor\t: 0\nmodel name\t: Test CPU\ncpu MHz\t\t: 2400.000\n";

    #[test]
    fn parse_proc_stat_cpu_line() {
        let (busy, total) = parse_proc_stat_cpu(STAT_T0).unwrap();
        assert_eq!(total, 1000 + 50 + 300 + 8000 + 200 + 25);
        assert_eq!(busy, total - 8000 - 200);
    }

    #[test]
    fn cpu_percent_is_pure_and_reproducible() {
        let first = cpu_percent_from_jiffies(1500, 1000, 10000, 9000);
        let second = cpu_percent_from_jiffies(1500, 1000, 10000, 9000);
        assert_eq!(first, second);
        assert!((first - 50.0).abs() < f64::EPSILON);

        // No elapsed time means no reading, not a division error.
        assert_eq!(cpu_percent_from_jiffies(1500, 1000, 9000, 9000), 0.0);
    }

    #[test]
    fn parse_meminfo_fields() {
        let (total, available) = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(total, 16384000);
        assert_eq!(available, 8192000);

        assert!(parse_meminfo("MemTotal: 123 kB\n").is_none());
    }

    #[test]
    fn parse_uptime_first_field() {
        assert_eq!(parse_uptime("12345.67 99999.99\n"), Some(12345));
        assert!(parse_uptime("").is_none());
    }

    #[test]
    fn parse_cpuinfo_first_mhz() {
        assert_eq!(parse_cpuinfo_mhz(CPUINFO), Some(2400.0));
        assert!(parse_cpuinfo_mhz("processor: 0\n").is_none());
    }

    #[tokio::test]
    async fn snapshot_from_synthetic_proc() {
        let proc = TempDir::new().unwrap();
        std_fs::write(proc.path().join("stat"), STAT_T0).unwrap();
        std_fs::write(proc.path().join("meminfo"), MEMINFO).unwrap();
        std_fs::write(proc.path().join("uptime"), "5000.00 10000.00\n").unwrap();
        std_fs::write(proc.path().join("cpuinfo"), CPUINFO).unwrap();

        let reader = HostStatsReader::with_proc_root(proc.path());

        let first = reader.read_snapshot("local", "node-a").await.unwrap();
        assert_eq!(first.host_id, "local");
        assert_eq!(first.cpu_percent, 0.0); // no delta on the first sample
        assert_eq!(first.cpu_frequency_mhz, 2400.0);
        assert_eq!(first.uptime_seconds, 5000);
        assert_eq!(first.memory_bytes, (16384000 - 8192000) * 1024);
        assert!(first.up);

        std_fs::write(proc.path().join("stat"), STAT_T1).unwrap();
        let second = reader.read_snapshot("local", "node-a").await.unwrap();
        assert!(second.cpu_percent > 0.0);
        assert!(second.timestamp >= first.timestamp);
    }
}
