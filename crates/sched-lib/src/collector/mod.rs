//! Telemetry collection from the submission host and batch scheduler
//!
//! This module provides a read-only view of cluster pressure: filesystem
//! capacity of the output volume, CPU load, memory availability and
//! per-queue occupancy. Sub-readings that cannot be obtained are recorded
//! as unknown instead of failing the whole snapshot.

mod history;
mod host;


pub use history::SnapshotHistory;
pub use host::{statvfs_usage, HostTelemetry, DEFAULT_READ_TIMEOUT};

use crate::models::{QueueReading, ResourceSnapshot};
use anyhow::Result;

pub use async_trait::async_trait;

/// Source of resource snapshots
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Capture a snapshot; unavailable sub-readings are `None`, never an error
    async fn capture(&self) -> ResourceSnapshot;
}

/// Reads queue occupancy from the batch scheduler
#[async_trait]
pub trait QueueProbe: Send + Sync {
    async fn occupancy(&self) -> Result<Vec<QueueReading>>;
}
