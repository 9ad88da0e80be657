//! Admission-controlled chunk sizing
//!
//! The chunk size is the minimum of a risk-scaled baseline and the hard
//! ceilings implied by remaining memory, CPU and storage headroom.

use crate::config::ChunkConfig;
use crate::models::{RiskAssessment, RiskLevel};
use serde::{Deserialize, Serialize};

/// What bounded the chosen chunk size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeLimit {
    /// Baseline scaled for the current risk level
    RiskScale,
    /// CRITICAL risk forced the minimum viable chunk
    CriticalMinimum,
    MemoryCeiling,
    CpuCeiling,
    StorageCeiling,
    /// Fewer samples than the computed size are left
    SampleCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkDecision {
    pub size: usize,
    pub limited_by: SizeLimit,
    pub risk: RiskLevel,
    /// Size before the hard ceilings were applied
    pub risk_scaled: usize,
}

/// Compute the chunk size for `sample_count` samples of `avg_sample_bytes` input
///
/// Always at least 1 and never above `config.max_chunk_size`.
pub fn compute_chunk_size(
    sample_count: usize,
    avg_sample_bytes: u64,
    risk: &RiskAssessment,
    config: &ChunkConfig,
) -> usize {
    decide_chunk_size(sample_count, avg_sample_bytes, risk, config).size
}

/// Same as [`compute_chunk_size`], also reporting which bound applied
pub fn decide_chunk_size(
    sample_count: usize,
    avg_sample_bytes: u64,
    risk: &RiskAssessment,
    config: &ChunkConfig,
) -> ChunkDecision {
    let level = risk.overall;
    let (risk_scaled, mut limited_by) = match config.scale.factor(level) {
        Some(factor) => {
            let scaled = (config.baseline_chunk_size as f64 * factor).floor() as usize;
            (
                scaled.clamp(config.min_chunk_size, config.max_chunk_size),
                SizeLimit::RiskScale,
            )
        }
        None => (
            config.min_chunk_size.min(config.max_chunk_size),
            SizeLimit::CriticalMinimum,
        ),
    };

    let mut size = risk_scaled;
    for (ceiling, limit) in hard_ceilings(avg_sample_bytes, risk, config) {
        if ceiling < size {
            size = ceiling;
            limited_by = limit;
        }
    }

    if sample_count > 0 && sample_count < size {
        size = sample_count;
        limited_by = SizeLimit::SampleCount;
    }

    ChunkDecision {
        size: size.max(1),
        limited_by,
        risk: level,
        risk_scaled,
    }
}

/// Ceilings from the headroom carried by the assessment; unknown readings impose none
fn hard_ceilings(
    avg_sample_bytes: u64,
    risk: &RiskAssessment,
    config: &ChunkConfig,
) -> Vec<(usize, SizeLimit)> {
    let headroom = &risk.headroom;
    let mut ceilings = Vec::with_capacity(3);

    if let Some(memory) = headroom.memory_available_bytes {
        if config.per_sample_memory_bytes > 0 {
            ceilings.push((
                (memory / config.per_sample_memory_bytes) as usize,
                SizeLimit::MemoryCeiling,
            ));
        }
    }

    if let Some(cpus) = headroom.cpus_available {
        if config.samples_per_cpu > 0 {
            ceilings.push((
                (cpus * config.samples_per_cpu as f64).floor() as usize,
                SizeLimit::CpuCeiling,
            ));
        }
    }

    if let Some(storage) = headroom.storage_available_bytes {
        let per_sample_output = avg_sample_bytes as f64 * config.output_multiplier;
        if per_sample_output > 0.0 {
            ceilings.push((
                (storage as f64 / per_sample_output).floor() as usize,
                SizeLimit::StorageCeiling,
            ));
        }
    }

    ceilings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CapacityHeadroom;

    const GB: u64 = 1_000_000_000;
    const TB: u64 = 1_000 * GB;

    fn assessment(level: RiskLevel, headroom: CapacityHeadroom) -> RiskAssessment {
        RiskAssessment {
            overall: level,
            resources: Vec::new(),
            storage_time_to_exhaustion: None,
            storage_growth_bytes_per_sec: None,
            headroom,
            mitigations: Vec::new(),
            assessed_at: 0,
        }
    }

    fn roomy() -> CapacityHeadroom {
        CapacityHeadroom {
            storage_available_bytes: Some(36 * TB),
            memory_available_bytes: Some(400 * 1024 * 1024 * 1024),
            cpus_available: Some(56.0),
        }
    }

    #[test]
    fn test_low_risk_returns_baseline() {
        let config = ChunkConfig::default();
        let decision =
            decide_chunk_size(35_674, 150_000_000, &assessment(RiskLevel::Low, roomy()), &config);
        assert_eq!(decision.size, 1000);
        assert_eq!(decision.limited_by, SizeLimit::RiskScale);
    }

    #[test]
    fn test_size_non_increasing_with_risk() {
        let config = ChunkConfig::default();
        let sizes: Vec<usize> = RiskLevel::ALL
            .iter()
            .map(|level| compute_chunk_size(35_674, 150_000_000, &assessment(*level, roomy()), &config))
            .collect();

        assert_eq!(sizes, vec![1000, 750, 500, 100]);
        assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_critical_forces_minimum() {
        let decision = decide_chunk_size(
            35_674,
            150_000_000,
            &assessment(RiskLevel::Critical, roomy()),
            &ChunkConfig::default(),
        );
        assert_eq!(decision.size, 100);
        assert_eq!(decision.limited_by, SizeLimit::CriticalMinimum);
    }

    #[test]
    fn test_cpu_ceiling_caps_baseline() {
        let headroom = CapacityHeadroom {
            cpus_available: Some(12.0),
            ..roomy()
        };
        let decision = decide_chunk_size(
            35_674,
            150_000_000,
            &assessment(RiskLevel::Low, headroom),
            &ChunkConfig::default(),
        );
        assert_eq!(decision.size, 240);
        assert_eq!(decision.limited_by, SizeLimit::CpuCeiling);
    }

    #[test]
    fn test_memory_ceiling_caps_baseline() {
        let headroom = CapacityHeadroom {
            memory_available_bytes: Some(10 * 64 * 1024 * 1024),
            ..roomy()
        };
        let decision = decide_chunk_size(
            35_674,
            150_000_000,
            &assessment(RiskLevel::Low, headroom),
            &ChunkConfig::default(),
        );
        assert_eq!(decision.size, 10);
        assert_eq!(decision.limited_by, SizeLimit::MemoryCeiling);
    }

    #[test]
    fn test_storage_ceiling_uses_output_multiplier() {
        // 100 GB free, 1 GB inputs at 2.7x output -> 37 samples fit
        let headroom = CapacityHeadroom {
            storage_available_bytes: Some(100 * GB),
            ..roomy()
        };
        let decision = decide_chunk_size(
            35_674,
            GB,
            &assessment(RiskLevel::Low, headroom),
            &ChunkConfig::default(),
        );
        assert_eq!(decision.size, 37);
        assert_eq!(decision.limited_by, SizeLimit::StorageCeiling);
    }

    #[test]
    fn test_full_storage_still_returns_one() {
        let headroom = CapacityHeadroom {
            storage_available_bytes: Some(0),
            ..roomy()
        };
        let size = compute_chunk_size(
            500,
            150_000_000,
            &assessment(RiskLevel::Critical, headroom),
            &ChunkConfig::default(),
        );
        assert_eq!(size, 1);
    }

    #[test]
    fn test_never_exceeds_configured_max() {
        let config = ChunkConfig {
            baseline_chunk_size: 2000,
            max_chunk_size: 2000,
            scale: crate::config::LevelScale {
                low: 3.0,
                medium: 1.0,
                high: 0.5,
            },
            ..ChunkConfig::default()
        };
        let size = compute_chunk_size(
            100_000,
            1,
            &assessment(RiskLevel::Low, CapacityHeadroom::default()),
            &config,
        );
        assert_eq!(size, 2000);
    }

    #[test]
    fn test_small_sample_sets_are_not_padded() {
        let decision = decide_chunk_size(
            42,
            150_000_000,
            &assessment(RiskLevel::Low, roomy()),
            &ChunkConfig::default(),
        );
        assert_eq!(decision.size, 42);
        assert_eq!(decision.limited_by, SizeLimit::SampleCount);
    }

    #[test]
    fn test_unknown_headroom_imposes_no_ceiling() {
        let size = compute_chunk_size(
            35_674,
            150_000_000,
            &assessment(RiskLevel::Medium, CapacityHeadroom::default()),
            &ChunkConfig::default(),
        );
        assert_eq!(size, 750);
    }
}
