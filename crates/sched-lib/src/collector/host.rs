//! Host telemetry
//!
//! Reads resource state of the submission host:
//! - statvfs on the output volume for storage capacity
//! - /proc/loadavg and /proc/stat for CPU load and core count
//! - /proc/meminfo for memory availability
//! - the scheduler's queue listing through a [`QueueProbe`]

use super::{QueueProbe, TelemetrySource};
use crate::error::SchedError;
use crate::models::{CpuReading, MemoryReading, QueueReading, ResourceSnapshot, StorageReading};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// Upper bound for any single sub-reading
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Telemetry source for the host the controller runs on
pub struct HostTelemetry {
    storage_path: PathBuf,
    proc_path: PathBuf,
    queue_probe: Option<Arc<dyn QueueProbe>>,
    read_timeout: Duration,
}

impl HostTelemetry {
    /// Create a collector measuring the volume that holds `storage_path`
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            proc_path: PathBuf::from("/proc"),
            queue_probe: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Use a custom proc path (for testing)
    pub fn with_proc_path(mut self, proc_path: impl Into<PathBuf>) -> Self {
        self.proc_path = proc_path.into();
        self
    }

    pub fn with_queue_probe(mut self, probe: Arc<dyn QueueProbe>) -> Self {
        self.queue_probe = Some(probe);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Parse /proc/meminfo contents (values in kB)
    pub fn parse_meminfo(content: &str) -> Option<MemoryReading> {
        let mut total_kb = None;
        let mut available_kb = None;

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                match parts[0] {
                    "MemTotal:" => total_kb = parts[1].parse::<u64>().ok(),
                    "MemAvailable:" => available_kb = parts[1].parse::<u64>().ok(),
                    _ => {}
                }
            }
        }

        Some(MemoryReading {
            total_bytes: total_kb? * 1024,
            available_bytes: available_kb? * 1024,
        })
    }

    /// Parse the one-minute load average from /proc/loadavg
    pub fn parse_loadavg(content: &str) -> Option<f64> {
        content.split_whitespace().next()?.parse().ok()
    }

    /// Count per-core `cpuN` lines in /proc/stat
    pub fn count_cpus(stat_content: &str) -> u32 {
        stat_content
            .lines()
            .filter(|line| {
                line.strip_prefix("cpu")
                    .and_then(|rest| rest.chars().next())
                    .is_some_and(|c| c.is_ascii_digit())
            })
            .count() as u32
    }

    async fn read_storage(&self) -> Result<StorageReading> {
        let path = self.storage_path.clone();
        tokio::task::spawn_blocking(move || statvfs_usage(&path))
            .await
            .context("statvfs task failed")?
    }

    async fn read_cpu(&self) -> Result<CpuReading> {
        let loadavg_path = self.proc_path.join("loadavg");
        let loadavg = fs::read_to_string(&loadavg_path)
            .await
            .with_context(|| format!("Failed to read {}", loadavg_path.display()))?;
        let load_avg = Self::parse_loadavg(&loadavg)
            .with_context(|| format!("Failed to parse {}", loadavg_path.display()))?;

        let stat_path = self.proc_path.join("stat");
        let stat = fs::read_to_string(&stat_path)
            .await
            .with_context(|| format!("Failed to read {}", stat_path.display()))?;
        let cpu_count = Self::count_cpus(&stat);
        if cpu_count == 0 {
            anyhow::bail!("No per-core entries in {}", stat_path.display());
        }

        Ok(CpuReading {
            cpu_count,
            load_avg,
        })
    }

    async fn read_memory(&self) -> Result<MemoryReading> {
        let path = self.proc_path.join("meminfo");
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse_meminfo(&content)
            .with_context(|| format!("MemTotal/MemAvailable missing from {}", path.display()))
    }

    async fn read_queues(&self) -> Result<Vec<QueueReading>> {
        match &self.queue_probe {
            Some(probe) => probe.occupancy().await,
            None => anyhow::bail!("No queue probe configured"),
        }
    }

    /// Run one sub-reading under the read timeout; failures become `None`
    async fn bounded<T, F>(&self, reading: &'static str, read: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let failure = match tokio::time::timeout(self.read_timeout, read).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("timed out after {}ms", self.read_timeout.as_millis()),
        };

        let error = SchedError::TelemetryUnavailable {
            reading,
            reason: failure,
        };
        warn!(reading = reading, error = %error, "Recording sub-reading as unknown");
        None
    }
}

/// Capacity of the filesystem holding `path`
///
/// Space reserved for root counts as used, so `available` is what an
/// unprivileged job can actually write.
pub fn statvfs_usage(path: &Path) -> Result<StorageReading> {
    let stat = nix::sys::statvfs::statvfs(path)
        .with_context(|| format!("statvfs failed for {}", path.display()))?;

    let fragment = stat.fragment_size() as u64;
    let total = stat.blocks() as u64 * fragment;
    let available = stat.blocks_available() as u64 * fragment;

    Ok(StorageReading::new(total, total.saturating_sub(available)))
}

#[async_trait]
impl TelemetrySource for HostTelemetry {
    async fn capture(&self) -> ResourceSnapshot {
        let captured_at = chrono::Utc::now().timestamp();

        let (storage, cpu, memory, queues) = tokio::join!(
            self.bounded("storage", self.read_storage()),
            self.bounded("cpu", self.read_cpu()),
            self.bounded("memory", self.read_memory()),
            self.bounded("queues", self.read_queues()),
        );

        let snapshot = ResourceSnapshot {
            captured_at,
            storage,
            cpu,
            memory,
            queues,
        };

        debug!(
            captured_at = captured_at,
            unknown = ?snapshot.unknown_readings(),
            "Captured resource snapshot"
        );

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meminfo() {
        let content = r#"MemTotal:       263846944 kB
MemFree:         1048576 kB
MemAvailable:   131923472 kB
Buffers:          204800 kB"#;

        let memory = HostTelemetry::parse_meminfo(content).unwrap();
        assert_eq!(memory.total_bytes, 263846944 * 1024);
        assert_eq!(memory.available_bytes, 131923472 * 1024);
    }

    #[test]
    fn test_parse_meminfo_missing_available() {
        let content = "MemTotal:       1024 kB\nMemFree:        512 kB\n";
        assert!(HostTelemetry::parse_meminfo(content).is_none());
    }

    #[test]
    fn test_parse_loadavg() {
        let load = HostTelemetry::parse_loadavg("12.50 10.01 8.75 3/1200 4242\n");
        assert_eq!(load, Some(12.5));
        assert_eq!(HostTelemetry::parse_loadavg(""), None);
    }

    #[test]
    fn test_count_cpus_ignores_aggregate_line() {
        let stat = r#"cpu  100 0 50 1000 0 0 0 0 0 0
cpu0 50 0 25 500 0 0 0 0 0 0
cpu1 50 0 25 500 0 0 0 0 0 0
intr 12345
ctxt 6789"#;
        assert_eq!(HostTelemetry::count_cpus(stat), 2);
    }

    #[test]
    fn test_statvfs_usage_of_current_dir() {
        let storage = statvfs_usage(Path::new(".")).unwrap();
        assert!(storage.total_bytes > 0);
        assert_eq!(
            storage.used_bytes + storage.available_bytes(),
            storage.total_bytes
        );
    }
}
