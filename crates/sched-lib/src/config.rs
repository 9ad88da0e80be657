//! Policy configuration for risk classification, chunk sizing and placement
//!
//! Every knob has a default matching the production alignment workflow,
//! so an empty configuration source yields a usable policy.

use crate::error::{Result, SchedError};
use crate::models::RiskLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub chunk: ChunkConfig,
    pub thresholds: RiskThresholds,
    pub trend: TrendConfig,
    pub queues: Vec<QueueProfile>,
    pub job: JobTemplate,
    pub retry: RetryPolicy,
    /// Inputs smaller than this are treated as empty wells during discovery
    pub min_input_bytes: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            thresholds: RiskThresholds::default(),
            trend: TrendConfig::default(),
            queues: QueueProfile::defaults(),
            job: JobTemplate::default(),
            retry: RetryPolicy::default(),
            min_input_bytes: 100_000,
        }
    }
}

impl ResourceConfig {
    /// Reject tables that would break the ordering guarantees of the policy
    pub fn validate(&self) -> Result<()> {
        let chunk = &self.chunk;
        if chunk.min_chunk_size == 0 {
            return Err(SchedError::Config("min_chunk_size must be at least 1".into()));
        }
        if !(chunk.min_chunk_size <= chunk.baseline_chunk_size
            && chunk.baseline_chunk_size <= chunk.max_chunk_size)
        {
            return Err(SchedError::Config(format!(
                "chunk sizes must satisfy min <= baseline <= max (got {} / {} / {})",
                chunk.min_chunk_size, chunk.baseline_chunk_size, chunk.max_chunk_size
            )));
        }
        let scale = &chunk.scale;
        if !(scale.low >= scale.medium && scale.medium >= scale.high && scale.high > 0.0) {
            return Err(SchedError::Config(
                "chunk scale factors must be positive and non-increasing with risk".into(),
            ));
        }
        if !(2.5..=3.0).contains(&chunk.output_multiplier) {
            return Err(SchedError::Config(format!(
                "output_multiplier {} outside the 2.5-3.0 range of the output format",
                chunk.output_multiplier
            )));
        }
        for (name, table) in [
            ("storage", &self.thresholds.storage),
            ("cpu", &self.thresholds.cpu),
            ("memory", &self.thresholds.memory),
            ("queue", &self.thresholds.queue),
        ] {
            table.validate(name)?;
        }
        if self.queues.is_empty() {
            return Err(SchedError::Config("at least one queue profile is required".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SchedError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn queue(&self, name: &str) -> Option<&QueueProfile> {
        self.queues.iter().find(|q| q.name == name)
    }
}

/// Chunk sizing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Smallest chunk worth a scheduler submission; forced under CRITICAL risk
    pub min_chunk_size: usize,
    pub baseline_chunk_size: usize,
    pub max_chunk_size: usize,
    pub scale: LevelScale,
    /// Worst-case memory footprint of one sample's alignment
    pub per_sample_memory_bytes: u64,
    pub samples_per_cpu: u32,
    /// Output size relative to input size
    pub output_multiplier: f64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 100,
            baseline_chunk_size: 1000,
            max_chunk_size: 2000,
            scale: LevelScale::default(),
            per_sample_memory_bytes: 64 * 1024 * 1024,
            samples_per_cpu: 20,
            output_multiplier: 2.7,
        }
    }
}

/// Baseline multipliers per risk level (CRITICAL always uses the minimum)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelScale {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for LevelScale {
    fn default() -> Self {
        Self {
            low: 1.0,
            medium: 0.75,
            high: 0.5,
        }
    }
}

impl LevelScale {
    pub fn factor(&self, level: RiskLevel) -> Option<f64> {
        match level {
            RiskLevel::Low => Some(self.low),
            RiskLevel::Medium => Some(self.medium),
            RiskLevel::High => Some(self.high),
            RiskLevel::Critical => None,
        }
    }
}

/// Lower bounds (occupancy fraction 0-1) at which each level starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl LevelThresholds {
    pub const fn new(medium: f64, high: f64, critical: f64) -> Self {
        Self {
            medium,
            high,
            critical,
        }
    }

    pub fn classify(&self, utilization: f64) -> RiskLevel {
        if utilization >= self.critical {
            RiskLevel::Critical
        } else if utilization >= self.high {
            RiskLevel::High
        } else if utilization >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.medium < self.high && self.high < self.critical && self.medium > 0.0 {
            Ok(())
        } else {
            Err(SchedError::Config(format!(
                "{} thresholds must be ascending and positive",
                name
            )))
        }
    }
}

/// Threshold table per resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub storage: LevelThresholds,
    pub cpu: LevelThresholds,
    pub memory: LevelThresholds,
    pub queue: LevelThresholds,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            storage: LevelThresholds::new(0.70, 0.85, 0.95),
            cpu: LevelThresholds::new(0.70, 0.85, 0.95),
            memory: LevelThresholds::new(0.70, 0.85, 0.95),
            queue: LevelThresholds::new(0.60, 0.80, 0.90),
        }
    }
}

/// Snapshot history and storage trend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub history_capacity: usize,
    /// Only snapshots this recent take part in the trend fit
    pub window_secs: u64,
    /// Storage risk escalates one level when exhaustion is projected sooner than this
    pub escalation_horizon_secs: u64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            window_secs: 6 * 3600,
            escalation_horizon_secs: 24 * 3600,
        }
    }
}

impl TrendConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn escalation_horizon(&self) -> Duration {
        Duration::from_secs(self.escalation_horizon_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueClass {
    /// Cheaper, higher-throughput queues
    Throughput,
    /// Queues with reserved resources and better per-job success odds
    Guaranteed,
}

/// Static description of one scheduler queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueProfile {
    pub name: String,
    pub class: QueueClass,
    /// Concurrent job limit used when the scheduler reports none
    pub max_slots: u32,
    pub max_threads: u32,
    pub max_memory_gb: u32,
    pub max_walltime_hours: u32,
    /// Observed fraction of jobs that finish without scheduler-side failure
    pub reliability: f64,
}

impl QueueProfile {
    pub fn defaults() -> Vec<QueueProfile> {
        vec![
            QueueProfile {
                name: "normal".to_string(),
                class: QueueClass::Throughput,
                max_slots: 100,
                max_threads: 16,
                max_memory_gb: 256,
                max_walltime_hours: 168,
                reliability: 0.95,
            },
            QueueProfile {
                name: "long".to_string(),
                class: QueueClass::Throughput,
                max_slots: 20,
                max_threads: 8,
                max_memory_gb: 128,
                max_walltime_hours: 720,
                reliability: 0.90,
            },
            QueueProfile {
                name: "hiprio".to_string(),
                class: QueueClass::Guaranteed,
                max_slots: 50,
                max_threads: 32,
                max_memory_gb: 512,
                max_walltime_hours: 72,
                reliability: 0.98,
            },
        ]
    }
}

/// Resources requested for every array element before queue clamping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobTemplate {
    pub threads: u32,
    pub memory_gb: u32,
    pub walltime_hours: u32,
}

impl Default for JobTemplate {
    fn default() -> Self {
        Self {
            threads: 8,
            memory_gb: 128,
            walltime_hours: 72,
        }
    }
}

/// Bounded exponential backoff for scheduler submissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to the maximum
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ResourceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_classify_uses_lower_bounds() {
        let table = LevelThresholds::new(0.70, 0.85, 0.95);
        assert_eq!(table.classify(0.40), RiskLevel::Low);
        assert_eq!(table.classify(0.70), RiskLevel::Medium);
        assert_eq!(table.classify(0.90), RiskLevel::High);
        assert_eq!(table.classify(0.95), RiskLevel::Critical);
        assert_eq!(table.classify(1.20), RiskLevel::Critical);
    }

    #[test]
    fn test_validate_rejects_increasing_scale() {
        let mut config = ResourceConfig::default();
        config.chunk.scale.high = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unordered_thresholds() {
        let mut config = ResourceConfig::default();
        config.thresholds.storage = LevelThresholds::new(0.9, 0.8, 0.95);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_baseline_above_max() {
        let mut config = ResourceConfig::default();
        config.chunk.baseline_chunk_size = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 3_000,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(3_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(3_000));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ResourceConfig =
            serde_json::from_str(r#"{"chunk": {"baseline_chunk_size": 500}}"#).unwrap();
        assert_eq!(config.chunk.baseline_chunk_size, 500);
        assert_eq!(config.chunk.max_chunk_size, 2000);
        assert_eq!(config.queues.len(), 3);
    }
}
