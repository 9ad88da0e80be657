//! Core data models for the alignment scheduler

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Filesystem capacity reading for the output volume
///
/// Only `total` and `used` are stored; `available` and `percent_used`
/// are derived so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageReading {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl StorageReading {
    pub fn new(total_bytes: u64, used_bytes: u64) -> Self {
        Self {
            total_bytes,
            used_bytes: used_bytes.min(total_bytes),
        }
    }

    pub fn available_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }

    /// Percentage of the volume in use (0-100)
    pub fn percent_used(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

/// CPU reading from the submission host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuReading {
    pub cpu_count: u32,
    /// One-minute load average
    pub load_avg: f64,
}

impl CpuReading {
    /// Load relative to the core count (1.0 = every core busy)
    pub fn utilization(&self) -> f64 {
        if self.cpu_count == 0 {
            return 1.0;
        }
        self.load_avg / self.cpu_count as f64
    }

    /// Cores not covered by the current load, never below one
    pub fn available_cpus(&self) -> f64 {
        (self.cpu_count as f64 - self.load_avg).max(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryReading {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryReading {
    pub fn utilization(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        1.0 - (self.available_bytes.min(self.total_bytes) as f64 / self.total_bytes as f64)
    }
}

/// Occupancy of one batch scheduler queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueReading {
    pub name: String,
    pub pending: u32,
    pub running: u32,
    /// Slot limit reported by the scheduler; `None` when unlimited
    pub slot_limit: Option<u32>,
}

impl QueueReading {
    /// Occupancy relative to `slot_limit`, falling back to the configured limit
    pub fn utilization(&self, configured_limit: u32) -> f64 {
        let limit = self.slot_limit.unwrap_or(configured_limit).max(1);
        (self.pending + self.running) as f64 / limit as f64
    }
}

/// Point-in-time reading of cluster resources
///
/// Any sub-reading that could not be obtained is `None` ("unknown").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Unix timestamp (seconds) of capture
    pub captured_at: i64,
    pub storage: Option<StorageReading>,
    pub cpu: Option<CpuReading>,
    pub memory: Option<MemoryReading>,
    pub queues: Option<Vec<QueueReading>>,
}

impl ResourceSnapshot {
    pub fn empty(captured_at: i64) -> Self {
        Self {
            captured_at,
            storage: None,
            cpu: None,
            memory: None,
            queues: None,
        }
    }

    pub fn queue(&self, name: &str) -> Option<&QueueReading> {
        self.queues
            .as_ref()
            .and_then(|queues| queues.iter().find(|q| q.name == name))
    }

    /// Names of the sub-readings that are unknown in this snapshot
    pub fn unknown_readings(&self) -> Vec<&'static str> {
        let mut unknown = Vec::new();
        if self.storage.is_none() {
            unknown.push("storage");
        }
        if self.cpu.is_none() {
            unknown.push("cpu");
        }
        if self.memory.is_none() {
            unknown.push("memory");
        }
        if self.queues.is_none() {
            unknown.push("queues");
        }
        unknown
    }
}

/// Ordered risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// One level up, saturating at `Critical`
    pub fn escalate(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium => RiskLevel::High,
            RiskLevel::High | RiskLevel::Critical => RiskLevel::Critical,
        }
    }

    /// Numeric value exported as a gauge
    pub fn as_gauge(self) -> f64 {
        match self {
            RiskLevel::Low => 0.0,
            RiskLevel::Medium => 1.0,
            RiskLevel::High => 2.0,
            RiskLevel::Critical => 3.0,
        }
    }

    /// Rough probability that the resource runs out before the next cycle settles
    pub fn exhaustion_probability(self) -> f64 {
        match self {
            RiskLevel::Low => 0.05,
            RiskLevel::Medium => 0.2,
            RiskLevel::High => 0.5,
            RiskLevel::Critical => 0.9,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Resource a risk level applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum ResourceKind {
    Storage,
    Cpu,
    Memory,
    Queue(String),
    /// Queue telemetry as a whole (used when occupancy is unknown)
    Queues,
}

impl ResourceKind {
    /// Whether the resource is shared by every queue
    pub fn is_cluster_wide(&self) -> bool {
        !matches!(self, ResourceKind::Queue(_) | ResourceKind::Queues)
    }

    pub fn label(&self) -> String {
        match self {
            ResourceKind::Storage => "storage".to_string(),
            ResourceKind::Cpu => "cpu".to_string(),
            ResourceKind::Memory => "memory".to_string(),
            ResourceKind::Queue(name) => format!("queue:{}", name),
            ResourceKind::Queues => "queues".to_string(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Risk classification of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRisk {
    pub resource: ResourceKind,
    pub level: RiskLevel,
    /// Occupancy fraction (0-1) the level was derived from; `None` if unknown
    pub utilization: Option<f64>,
    pub exhaustion_probability: f64,
    /// Whether the level was escalated by the storage trend
    pub escalated: bool,
}

/// Remaining capacity carried with an assessment for chunk ceilings
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacityHeadroom {
    pub storage_available_bytes: Option<u64>,
    pub memory_available_bytes: Option<u64>,
    pub cpus_available: Option<f64>,
}

/// Risk derived from the snapshot history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Maximum level across all resources
    pub overall: RiskLevel,
    pub resources: Vec<ResourceRisk>,
    /// Projected time until storage is full; absent for flat or improving trends
    pub storage_time_to_exhaustion: Option<Duration>,
    /// Storage growth rate in bytes per second, when a trend could be fitted
    pub storage_growth_bytes_per_sec: Option<f64>,
    pub headroom: CapacityHeadroom,
    /// Advisory only
    pub mitigations: Vec<String>,
    /// Timestamp of the newest snapshot the assessment used
    pub assessed_at: i64,
}

impl RiskAssessment {
    pub fn level_of(&self, resource: &ResourceKind) -> Option<RiskLevel> {
        self.resources
            .iter()
            .find(|r| &r.resource == resource)
            .map(|r| r.level)
    }

    pub fn storage_level(&self) -> RiskLevel {
        self.level_of(&ResourceKind::Storage)
            .unwrap_or(RiskLevel::Medium)
    }

    /// Resources classified at `level` or above
    pub fn resources_at_least(&self, level: RiskLevel) -> Vec<&ResourceRisk> {
        self.resources.iter().filter(|r| r.level >= level).collect()
    }
}

/// Processing status of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Pending,
    Submitted,
    Running,
    Completed,
    Failed,
}

impl SampleStatus {
    pub const ALL: [SampleStatus; 5] = [
        SampleStatus::Pending,
        SampleStatus::Submitted,
        SampleStatus::Running,
        SampleStatus::Completed,
        SampleStatus::Failed,
    ];

    fn rank(self) -> u8 {
        match self {
            SampleStatus::Pending => 0,
            SampleStatus::Submitted => 1,
            SampleStatus::Running => 2,
            SampleStatus::Completed | SampleStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SampleStatus::Completed | SampleStatus::Failed)
    }

    /// Forward-only transition law; skipping intermediate states is allowed
    pub fn can_transition_to(self, next: SampleStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SampleStatus::Pending => "pending",
            SampleStatus::Submitted => "submitted",
            SampleStatus::Running => "running",
            SampleStatus::Completed => "completed",
            SampleStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SampleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(SampleStatus::Pending),
            "submitted" => Ok(SampleStatus::Submitted),
            "running" => Ok(SampleStatus::Running),
            "completed" => Ok(SampleStatus::Completed),
            "failed" => Ok(SampleStatus::Failed),
            other => Err(format!("unknown sample status '{}'", other)),
        }
    }
}

/// One paired-end sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub sample_id: String,
    pub r1_path: PathBuf,
    pub r2_path: PathBuf,
    pub r1_size_bytes: u64,
    pub r2_size_bytes: u64,
    pub status: SampleStatus,
}

impl Sample {
    pub fn input_bytes(&self) -> u64 {
        self.r1_size_bytes.saturating_add(self.r2_size_bytes)
    }
}

/// Mean input size across samples, zero for an empty slice
pub fn average_input_bytes(samples: &[Sample]) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let total: u128 = samples.iter().map(|s| s.input_bytes() as u128).sum();
    (total / samples.len() as u128) as u64
}

/// Group of samples submitted as one array job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub samples: Vec<Sample>,
    pub queue: String,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_ids(&self) -> Vec<String> {
        self.samples.iter().map(|s| s.sample_id.clone()).collect()
    }
}

/// Resolved scheduler parameters for one array job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResources {
    pub threads: u32,
    pub memory_gb: u32,
    pub walltime: Duration,
    pub queue: String,
}

/// A chunk ready for submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPlan {
    pub chunk: Chunk,
    pub resources: JobResources,
    pub success_probability: f64,
    /// Risk level the plan was made under
    pub risk: RiskLevel,
}

impl SubmissionPlan {
    pub fn array_size(&self) -> usize {
        self.chunk.len()
    }
}
