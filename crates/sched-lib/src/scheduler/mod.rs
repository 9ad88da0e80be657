//! Batch scheduler boundary
//!
//! The control loop talks to the cluster's batch system through
//! [`BatchScheduler`]; [`LsfScheduler`] implements it (and the telemetry
//! [`QueueProbe`](crate::collector::QueueProbe)) on top of the LSF commands.

mod lsf;

pub use lsf::{parse_bjobs, parse_bqueues, parse_bsub_output, LsfConfig, LsfScheduler};

use crate::error::Result;
use crate::models::SampleStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Scheduler-assigned job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource descriptor for one array job submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub job_name: String,
    pub array_size: usize,
    pub threads: u32,
    pub memory_gb: u32,
    pub walltime: Duration,
    pub queue: String,
    /// Chunk manifest; array index `i` runs row `i`
    pub manifest_path: PathBuf,
    pub log_dir: PathBuf,
}

/// Scheduler-reported state of one array element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayTaskState {
    Queued,
    Running,
    Done,
    Failed,
    Unknown,
}

impl ArrayTaskState {
    /// Sample status implied by the task state; `None` leaves the sample untouched
    pub fn sample_status(self) -> Option<SampleStatus> {
        match self {
            ArrayTaskState::Queued => Some(SampleStatus::Submitted),
            ArrayTaskState::Running => Some(SampleStatus::Running),
            ArrayTaskState::Done => Some(SampleStatus::Completed),
            ArrayTaskState::Failed => Some(SampleStatus::Failed),
            ArrayTaskState::Unknown => None,
        }
    }
}

/// Per-index status of an array job
///
/// Keys are 0-based offsets into the chunk's sample order. Indices the
/// scheduler has not reported on yet are simply absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayStatusReport {
    pub job_id: JobId,
    pub tasks: BTreeMap<usize, ArrayTaskState>,
}

impl ArrayStatusReport {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            tasks: BTreeMap::new(),
        }
    }

    pub fn with_task(mut self, index: usize, state: ArrayTaskState) -> Self {
        self.tasks.insert(index, state);
        self
    }

    pub fn state_of(&self, index: usize) -> Option<ArrayTaskState> {
        self.tasks.get(&index).copied()
    }

    pub fn reported(&self) -> usize {
        self.tasks.len()
    }
}

/// External batch system
#[async_trait]
pub trait BatchScheduler: Send + Sync {
    async fn submit(&self, request: &JobRequest) -> Result<JobId>;

    async fn query(&self, job: &JobId) -> Result<ArrayStatusReport>;

    async fn kill(&self, job: &JobId) -> Result<()>;
}
