//! Bounded snapshot history
//!
//! Keeps the most recent snapshots in capture order (most-recent-last)
//! for trend derivation, with optional JSON persistence so the storage
//! trend survives a controller restart.

use crate::models::ResourceSnapshot;
use crate::persist;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Default number of retained snapshots
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHistory {
    capacity: usize,
    snapshots: Vec<ResourceSnapshot>,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            snapshots: Vec::new(),
        }
    }

    /// Append a snapshot, evicting the oldest entries beyond capacity
    ///
    /// Snapshots older than the newest retained one are dropped so the
    /// history stays ordered.
    pub fn push(&mut self, snapshot: ResourceSnapshot) {
        if let Some(latest) = self.snapshots.last() {
            if snapshot.captured_at < latest.captured_at {
                warn!(
                    captured_at = snapshot.captured_at,
                    latest = latest.captured_at,
                    "Dropping out-of-order snapshot"
                );
                return;
            }
        }

        self.snapshots.push(snapshot);
        if self.snapshots.len() > self.capacity {
            let excess = self.snapshots.len() - self.capacity;
            self.snapshots.drain(0..excess);
        }
    }

    pub fn as_slice(&self) -> &[ResourceSnapshot] {
        &self.snapshots
    }

    pub fn latest(&self) -> Option<&ResourceSnapshot> {
        self.snapshots.last()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        persist::write_json(path, self)?;
        debug!(path = %path.display(), entries = self.snapshots.len(), "History saved");
        Ok(())
    }

    /// Load a persisted history, re-bounding it to `capacity`
    ///
    /// A missing or unreadable file yields an empty history.
    pub fn load_or_new(path: &Path, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        match persist::read_json::<SnapshotHistory>(path) {
            Ok(Some(stored)) => {
                for snapshot in stored.snapshots {
                    history.push(snapshot);
                }
                info!(path = %path.display(), entries = history.len(), "Loaded snapshot history");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Failed to load snapshot history, starting fresh");
            }
        }
        history
    }
}
