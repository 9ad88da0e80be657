//! Risk classification over the snapshot history
//!
//! Storage is classified from its instantaneous fill level and escalated one
//! level when the fitted trend projects exhaustion inside the escalation
//! horizon. CPU, memory and queues use instantaneous occupancy only. Unknown
//! readings classify as MEDIUM, and the overall level is the maximum.

use super::trend::{fit_storage_trend, StorageTrend};
use crate::config::{QueueProfile, ResourceConfig, RiskThresholds, TrendConfig};
use crate::models::{
    CapacityHeadroom, ResourceKind, ResourceRisk, ResourceSnapshot, RiskAssessment, RiskLevel,
};
use std::time::Duration;

/// Level assigned to a resource whose reading is unknown
pub const UNKNOWN_RISK: RiskLevel = RiskLevel::Medium;

/// Derives [`RiskAssessment`]s from snapshot history
#[derive(Debug, Clone)]
pub struct RiskEngine {
    thresholds: RiskThresholds,
    trend: TrendConfig,
    queues: Vec<QueueProfile>,
}

impl RiskEngine {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            trend: config.trend.clone(),
            queues: config.queues.clone(),
        }
    }

    /// Assess risk from `history` (most-recent-last)
    ///
    /// Pure function of its input: no clock reads, no I/O.
    pub fn assess(&self, history: &[ResourceSnapshot]) -> RiskAssessment {
        let empty = ResourceSnapshot::empty(0);
        let latest = history.last().unwrap_or(&empty);

        let trend = if history.len() >= 2 {
            fit_storage_trend(history, self.trend.window())
        } else {
            None
        };

        let mut resources = Vec::new();
        let mut mitigations = Vec::new();

        resources.push(self.assess_storage(latest, trend.as_ref(), &mut mitigations));
        resources.push(self.assess_cpu(latest, &mut mitigations));
        resources.push(self.assess_memory(latest, &mut mitigations));
        resources.extend(self.assess_queues(latest, &mut mitigations));

        let overall = resources
            .iter()
            .map(|r| r.level)
            .max()
            .unwrap_or(UNKNOWN_RISK);

        mitigations.push(overall_guidance(overall).to_string());

        RiskAssessment {
            overall,
            resources,
            storage_time_to_exhaustion: trend.as_ref().and_then(|t| t.time_to_exhaustion),
            storage_growth_bytes_per_sec: trend.as_ref().map(|t| t.slope_bytes_per_sec),
            headroom: CapacityHeadroom {
                storage_available_bytes: latest.storage.map(|s| s.available_bytes()),
                memory_available_bytes: latest.memory.map(|m| m.available_bytes),
                cpus_available: latest.cpu.map(|c| c.available_cpus()),
            },
            mitigations,
            assessed_at: latest.captured_at,
        }
    }

    fn assess_storage(
        &self,
        latest: &ResourceSnapshot,
        trend: Option<&StorageTrend>,
        mitigations: &mut Vec<String>,
    ) -> ResourceRisk {
        let Some(storage) = latest.storage else {
            mitigations.push(unknown_guidance(&ResourceKind::Storage));
            return unknown_risk(ResourceKind::Storage);
        };

        let utilization = storage.percent_used() / 100.0;
        let instantaneous = self.thresholds.storage.classify(utilization);

        let time_to_exhaustion = trend.and_then(|t| t.time_to_exhaustion);
        let escalated = time_to_exhaustion
            .is_some_and(|tte| tte < self.trend.escalation_horizon())
            && instantaneous < RiskLevel::Critical;
        let level = if escalated {
            instantaneous.escalate()
        } else {
            instantaneous
        };

        match level {
            RiskLevel::Critical => mitigations.push(format!(
                "Storage {:.1}% used: free space on the output volume before submitting more chunks",
                storage.percent_used()
            )),
            RiskLevel::High => mitigations.push(format!(
                "Storage {:.1}% used: shrink chunks and clean intermediate files",
                storage.percent_used()
            )),
            RiskLevel::Medium => mitigations.push(format!(
                "Storage {:.1}% used: watch output growth",
                storage.percent_used()
            )),
            RiskLevel::Low => {}
        }
        if let Some(tte) = time_to_exhaustion.filter(|_| escalated) {
            mitigations.push(format!(
                "Storage projected full in {} at the current growth rate",
                format_duration(tte)
            ));
        }

        ResourceRisk {
            resource: ResourceKind::Storage,
            level,
            utilization: Some(utilization),
            exhaustion_probability: level.exhaustion_probability(),
            escalated,
        }
    }

    fn assess_cpu(&self, latest: &ResourceSnapshot, mitigations: &mut Vec<String>) -> ResourceRisk {
        let Some(cpu) = latest.cpu else {
            mitigations.push(unknown_guidance(&ResourceKind::Cpu));
            return unknown_risk(ResourceKind::Cpu);
        };

        let utilization = cpu.utilization();
        let level = self.thresholds.cpu.classify(utilization);
        if level >= RiskLevel::High {
            mitigations.push(format!(
                "CPU load {:.2} on {} cores: reduce concurrent submissions",
                cpu.load_avg, cpu.cpu_count
            ));
        }
        instantaneous_risk(ResourceKind::Cpu, level, utilization)
    }

    fn assess_memory(
        &self,
        latest: &ResourceSnapshot,
        mitigations: &mut Vec<String>,
    ) -> ResourceRisk {
        let Some(memory) = latest.memory else {
            mitigations.push(unknown_guidance(&ResourceKind::Memory));
            return unknown_risk(ResourceKind::Memory);
        };

        let utilization = memory.utilization();
        let level = self.thresholds.memory.classify(utilization);
        if level >= RiskLevel::High {
            mitigations.push(format!(
                "Memory {:.1}% used: lower per-job memory or chunk size",
                utilization * 100.0
            ));
        }
        instantaneous_risk(ResourceKind::Memory, level, utilization)
    }

    fn assess_queues(
        &self,
        latest: &ResourceSnapshot,
        mitigations: &mut Vec<String>,
    ) -> Vec<ResourceRisk> {
        if latest.queues.is_none() {
            mitigations.push(unknown_guidance(&ResourceKind::Queues));
            return vec![unknown_risk(ResourceKind::Queues)];
        }

        self.queues
            .iter()
            .map(|profile| {
                let kind = ResourceKind::Queue(profile.name.clone());
                match latest.queue(&profile.name) {
                    Some(reading) => {
                        let utilization = reading.utilization(profile.max_slots);
                        let level = self.thresholds.queue.classify(utilization);
                        if level >= RiskLevel::High {
                            mitigations.push(format!(
                                "Queue {} {:.0}% occupied: prefer alternative queues",
                                profile.name,
                                utilization * 100.0
                            ));
                        }
                        instantaneous_risk(kind, level, utilization)
                    }
                    None => {
                        mitigations.push(unknown_guidance(&kind));
                        unknown_risk(kind)
                    }
                }
            })
            .collect()
    }
}

fn instantaneous_risk(resource: ResourceKind, level: RiskLevel, utilization: f64) -> ResourceRisk {
    ResourceRisk {
        resource,
        level,
        utilization: Some(utilization),
        exhaustion_probability: level.exhaustion_probability(),
        escalated: false,
    }
}

fn unknown_risk(resource: ResourceKind) -> ResourceRisk {
    ResourceRisk {
        resource,
        level: UNKNOWN_RISK,
        utilization: None,
        exhaustion_probability: UNKNOWN_RISK.exhaustion_probability(),
        escalated: false,
    }
}

fn unknown_guidance(resource: &ResourceKind) -> String {
    format!("No {} telemetry: verify the reading source", resource)
}

fn overall_guidance(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => "CRITICAL: submissions blocked until resources are freed",
        RiskLevel::High => "HIGH: placing chunks on guaranteed queues with reduced size",
        RiskLevel::Medium => "MEDIUM: continue with reduced chunk size and close monitoring",
        RiskLevel::Low => "LOW: normal operations",
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{:.1}h", secs as f64 / 3600.0)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
