//! Error taxonomy for scheduling decisions

use crate::models::{ResourceKind, RiskLevel, SampleStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = SchedError> = std::result::Result<T, E>;

/// Blocking condition reported when no compliant plan exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionRefusal {
    pub level: RiskLevel,
    pub blocking: Vec<ResourceKind>,
    /// Chunk size the planner was asked to place
    pub refused_chunk_size: usize,
    pub pending_samples: usize,
    pub mitigations: Vec<String>,
}

impl std::fmt::Display for AdmissionRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let blocking: Vec<String> = self.blocking.iter().map(|r| r.label()).collect();
        write!(
            f,
            "{} risk on [{}], refused chunk size {} for {} pending samples",
            self.level,
            blocking.join(", "),
            self.refused_chunk_size,
            self.pending_samples
        )
    }
}

#[derive(Debug, Error)]
pub enum SchedError {
    #[error("telemetry unavailable for {reading}: {reason}")]
    TelemetryUnavailable { reading: &'static str, reason: String },

    #[error("admission refused: {0}")]
    AdmissionRefused(Box<AdmissionRefusal>),

    #[error("submission of chunk {chunk_id} failed after {attempts} attempts: {reason}")]
    SubmissionFailed {
        chunk_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("input for sample {sample_id} is missing: {}", path.display())]
    SampleInputMissing { sample_id: String, path: PathBuf },

    #[error("status update conflict for sample {sample_id}: {from} -> {to}")]
    StatusUpdateConflict {
        sample_id: String,
        from: SampleStatus,
        to: SampleStatus,
    },

    #[error("unknown sample {0}")]
    UnknownSample(String),

    #[error("unknown chunk {0}")]
    UnknownChunk(String),

    #[error("chunk {chunk_id} conflicts with existing state: {reason}")]
    ChunkConflict { chunk_id: String, reason: String },

    #[error("manifest error at line {line}: {reason}")]
    Manifest { line: usize, reason: String },

    #[error("batch scheduler error: {0}")]
    Scheduler(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SchedError {
    pub fn refusal(&self) -> Option<&AdmissionRefusal> {
        match self {
            SchedError::AdmissionRefused(refusal) => Some(refusal),
            _ => None,
        }
    }

    /// Whether the failure may clear on its own and is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedError::Scheduler(_) | SchedError::TelemetryUnavailable { .. }
        )
    }
}
