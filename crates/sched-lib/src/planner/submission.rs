//! Queue-aware submission planning
//!
//! Partitions samples into contiguous chunks and places each chunk on a
//! scheduler queue. Placement is greedy and deterministic: the same samples
//! under the same assessment always yield the same plans.

use crate::config::{JobTemplate, QueueClass, QueueProfile, ResourceConfig};
use crate::error::{AdmissionRefusal, Result, SchedError};
use crate::models::{
    Chunk, JobResources, ResourceKind, RiskAssessment, RiskLevel, Sample, SubmissionPlan,
};
use std::time::Duration;
use tracing::debug;

/// Chunk identifier for the `index`-th chunk (1-based)
pub fn chunk_id(index: usize) -> String {
    format!("chunk_{:03}", index)
}

/// Risk multiplier applied to a queue's reliability
pub fn risk_success_factor(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::Low => 1.0,
        RiskLevel::Medium => 0.9,
        RiskLevel::High => 0.75,
        RiskLevel::Critical => 0.5,
    }
}

/// Queue class preferred at a given overall risk level
pub fn preferred_class(level: RiskLevel) -> QueueClass {
    match level {
        RiskLevel::Low | RiskLevel::Medium => QueueClass::Throughput,
        RiskLevel::High | RiskLevel::Critical => QueueClass::Guaranteed,
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionPlanner {
    queues: Vec<QueueProfile>,
    job: JobTemplate,
}

/// Queue considered for placement together with its current pressure
struct Candidate<'a> {
    profile: &'a QueueProfile,
    level: RiskLevel,
    utilization: f64,
    assigned: u32,
}

impl Candidate<'_> {
    fn projected_utilization(&self) -> f64 {
        self.utilization + self.assigned as f64 / self.profile.max_slots.max(1) as f64
    }
}

impl SubmissionPlanner {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            queues: config.queues.clone(),
            job: config.job.clone(),
        }
    }

    /// Plan `samples` with chunk ids starting at `chunk_001`
    pub fn plan(
        &self,
        samples: &[Sample],
        chunk_size: usize,
        risk: &RiskAssessment,
    ) -> Result<Vec<SubmissionPlan>> {
        self.plan_from(samples, chunk_size, risk, 1)
    }

    /// Plan `samples`, numbering chunks from `first_index`
    ///
    /// Returns [`SchedError::AdmissionRefused`] and no plans when a
    /// cluster-wide resource is CRITICAL or every queue is CRITICAL.
    pub fn plan_from(
        &self,
        samples: &[Sample],
        chunk_size: usize,
        risk: &RiskAssessment,
        first_index: usize,
    ) -> Result<Vec<SubmissionPlan>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_size = chunk_size.max(1);
        let mut candidates = self.admit(risk, chunk_size, samples.len())?;

        let preferred = preferred_class(risk.overall);
        if candidates.iter().any(|c| c.profile.class == preferred) {
            candidates.retain(|c| c.profile.class == preferred);
        }

        let plans: Vec<SubmissionPlan> = samples
            .chunks(chunk_size)
            .enumerate()
            .map(|(offset, members)| {
                let queue = select_queue(&mut candidates);
                SubmissionPlan {
                    chunk: Chunk {
                        chunk_id: chunk_id(first_index + offset),
                        samples: members.to_vec(),
                        queue: queue.name.clone(),
                    },
                    resources: self.resources_for(queue),
                    success_probability: success_probability(queue, risk.overall),
                    risk: risk.overall,
                }
            })
            .collect();

        debug!(
            chunks = plans.len(),
            chunk_size = chunk_size,
            risk = %risk.overall,
            "Planned submissions"
        );

        Ok(plans)
    }

    /// Whether new work may be handed to the scheduler under `risk`
    ///
    /// Applies to submitting already-planned chunks as much as to planning
    /// new ones. `waiting` is the number of samples held back on refusal.
    pub fn check_admission(
        &self,
        risk: &RiskAssessment,
        chunk_size: usize,
        waiting: usize,
    ) -> Result<()> {
        self.admit(risk, chunk_size, waiting).map(|_| ())
    }

    fn admit(
        &self,
        risk: &RiskAssessment,
        chunk_size: usize,
        waiting: usize,
    ) -> Result<Vec<Candidate<'_>>> {
        let blocking: Vec<ResourceKind> = risk
            .resources_at_least(RiskLevel::Critical)
            .into_iter()
            .filter(|r| r.resource.is_cluster_wide())
            .map(|r| r.resource.clone())
            .collect();
        if !blocking.is_empty() {
            return Err(refuse(blocking, chunk_size, waiting, risk));
        }

        let candidates = self.candidates(risk);
        if candidates.is_empty() {
            let blocking = self
                .queues
                .iter()
                .map(|q| ResourceKind::Queue(q.name.clone()))
                .collect();
            return Err(refuse(blocking, chunk_size, waiting, risk));
        }
        Ok(candidates)
    }

    /// Whether `queue` can still take work under `risk`
    pub fn queue_admits(&self, queue: &str, risk: &RiskAssessment) -> bool {
        self.candidates(risk)
            .iter()
            .any(|c| c.profile.name == queue)
    }

    /// Queues that are not individually CRITICAL, in configuration order
    fn candidates(&self, risk: &RiskAssessment) -> Vec<Candidate<'_>> {
        let fleet_level = risk.level_of(&ResourceKind::Queues);
        self.queues
            .iter()
            .filter_map(|profile| {
                let kind = ResourceKind::Queue(profile.name.clone());
                let entry = risk.resources.iter().find(|r| r.resource == kind);
                let level = entry
                    .map(|r| r.level)
                    .or(fleet_level)
                    .unwrap_or(RiskLevel::Medium);
                if level == RiskLevel::Critical {
                    return None;
                }
                Some(Candidate {
                    profile,
                    level,
                    utilization: entry.and_then(|r| r.utilization).unwrap_or(0.0),
                    assigned: 0,
                })
            })
            .collect()
    }

    /// Job template clamped to the queue's per-job ceilings
    pub fn resources_for(&self, queue: &QueueProfile) -> JobResources {
        let walltime_hours = self.job.walltime_hours.min(queue.max_walltime_hours);
        JobResources {
            threads: self.job.threads.min(queue.max_threads).max(1),
            memory_gb: self.job.memory_gb.min(queue.max_memory_gb).max(1),
            walltime: Duration::from_secs(walltime_hours.max(1) as u64 * 3600),
            queue: queue.name.clone(),
        }
    }
}

/// Pick the least pressured candidate, preferring reliability on ties
fn select_queue<'a>(candidates: &mut [Candidate<'a>]) -> &'a QueueProfile {
    let mut best = 0;
    for (i, candidate) in candidates.iter().enumerate().skip(1) {
        let current = &candidates[best];
        let better = match candidate.level.cmp(&current.level) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => {
                let (a, b) = (
                    candidate.projected_utilization(),
                    current.projected_utilization(),
                );
                if (a - b).abs() > f64::EPSILON {
                    a < b
                } else {
                    candidate.profile.reliability > current.profile.reliability
                }
            }
        };
        if better {
            best = i;
        }
    }
    candidates[best].assigned += 1;
    candidates[best].profile
}

fn success_probability(queue: &QueueProfile, level: RiskLevel) -> f64 {
    (queue.reliability * risk_success_factor(level)).clamp(0.0, 1.0)
}

fn refuse(
    blocking: Vec<ResourceKind>,
    chunk_size: usize,
    pending_samples: usize,
    risk: &RiskAssessment,
) -> SchedError {
    SchedError::AdmissionRefused(Box::new(AdmissionRefusal {
        level: RiskLevel::Critical,
        blocking,
        refused_chunk_size: chunk_size,
        pending_samples,
        mitigations: risk.mitigations.clone(),
    }))
}
