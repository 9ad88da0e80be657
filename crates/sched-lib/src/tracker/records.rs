//! Persisted tracker records

use crate::models::{JobResources, RiskLevel, SampleStatus, SubmissionPlan};
use crate::scheduler::JobRequest;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    /// Recorded, not yet accepted by the scheduler
    Planned,
    Submitted,
    /// Plan dropped before submission
    Withdrawn,
    /// Scheduler refused the plan after every retry
    SubmitFailed,
    /// Killed at the scheduler after submission
    Cancelled,
}

impl ChunkState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkState::Planned => "planned",
            ChunkState::Submitted => "submitted",
            ChunkState::Withdrawn => "withdrawn",
            ChunkState::SubmitFailed => "submit_failed",
            ChunkState::Cancelled => "cancelled",
        }
    }
}

/// Audit record of a chunk and the plan it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub queue: String,
    /// Member sample ids in array-index order; fixed once submitted
    pub sample_ids: Vec<String>,
    /// Samples dropped from the chunk before submission
    #[serde(default)]
    pub excluded: Vec<String>,
    pub resources: JobResources,
    pub success_probability: f64,
    pub risk: RiskLevel,
    pub state: ChunkState,
    pub job_id: Option<String>,
    pub planned_at: i64,
    pub submitted_at: Option<i64>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ChunkRecord {
    pub(crate) fn from_plan(plan: &SubmissionPlan, at: i64) -> Self {
        Self {
            chunk_id: plan.chunk.chunk_id.clone(),
            queue: plan.chunk.queue.clone(),
            sample_ids: plan.chunk.sample_ids(),
            excluded: Vec::new(),
            resources: plan.resources.clone(),
            success_probability: plan.success_probability,
            risk: plan.risk,
            state: ChunkState::Planned,
            job_id: None,
            planned_at: at,
            submitted_at: None,
            note: None,
        }
    }

    /// Array job request for the chunk's current members
    pub fn job_request(
        &self,
        manifest_path: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> JobRequest {
        JobRequest {
            job_name: self.chunk_id.clone(),
            array_size: self.sample_ids.len(),
            threads: self.resources.threads,
            memory_gb: self.resources.memory_gb,
            walltime: self.resources.walltime,
            queue: self.resources.queue.clone(),
            manifest_path: manifest_path.into(),
            log_dir: log_dir.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Transition,
    /// Operator-initiated reset, the only way out of a terminal state
    AdminReset,
    /// Backward or out-of-order update that was not applied
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: i64,
    pub sample_id: String,
    pub from: SampleStatus,
    pub to: SampleStatus,
    pub kind: AuditKind,
    pub chunk_id: Option<String>,
    pub reason: Option<String>,
}

/// Sample counts per status plus chunk counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerSummary {
    pub total_samples: usize,
    pub pending: usize,
    pub submitted: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    /// Pending samples not owned by a live chunk
    pub unassigned: usize,
    pub planned_chunks: usize,
    pub submitted_chunks: usize,
}

impl TrackerSummary {
    pub fn count(&self, status: SampleStatus) -> usize {
        match status {
            SampleStatus::Pending => self.pending,
            SampleStatus::Submitted => self.submitted,
            SampleStatus::Running => self.running,
            SampleStatus::Completed => self.completed,
            SampleStatus::Failed => self.failed,
        }
    }
}

/// Result of applying one scheduler array report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub updated: usize,
    pub unchanged: usize,
    /// Backward transitions that were rejected
    pub conflicts: usize,
    /// Indices outside the chunk or no longer owned by it
    pub ignored: usize,
}
