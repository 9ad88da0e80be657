//! Observability for the scheduler
//!
//! Provides:
//! - Prometheus metrics (risk levels, chunk size, sample counts, submission outcomes, latencies)
//! - Structured logging of operator-relevant events with a stable `event` field

use crate::error::AdmissionRefusal;
use crate::models::{ResourceKind, RiskAssessment, RiskLevel, SampleStatus};
use crate::tracker::TrackerSummary;
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge, register_int_gauge_vec, Gauge, GaugeVec,
    Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Latency buckets in seconds; scheduler commands dominate the upper end
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

static GLOBAL_METRICS: OnceLock<SchedulerMetricsInner> = OnceLock::new();

struct SchedulerMetricsInner {
    risk_level: GaugeVec,
    storage_percent_used: Gauge,
    chunk_size: IntGauge,
    samples: IntGaugeVec,
    plans_created: IntCounter,
    admission_refusals: IntCounter,
    submissions: IntCounter,
    submission_retries: IntCounter,
    submission_failures: IntCounter,
    telemetry_errors: IntCounterVec,
    status_conflicts: IntCounter,
    telemetry_latency_seconds: Histogram,
    cycle_latency_seconds: Histogram,
}

impl SchedulerMetricsInner {
    fn new() -> Self {
        Self {
            risk_level: register_gauge_vec!(
                "align_scheduler_risk_level",
                "Risk level per resource (0=LOW, 1=MEDIUM, 2=HIGH, 3=CRITICAL)",
                &["resource"]
            )
            .expect("Failed to register risk_level"),

            storage_percent_used: register_gauge!(
                "align_scheduler_storage_percent_used",
                "Output volume usage in percent"
            )
            .expect("Failed to register storage_percent_used"),

            chunk_size: register_int_gauge!(
                "align_scheduler_chunk_size",
                "Chunk size chosen in the latest cycle"
            )
            .expect("Failed to register chunk_size"),

            samples: register_int_gauge_vec!(
                "align_scheduler_samples",
                "Samples per processing status",
                &["status"]
            )
            .expect("Failed to register samples"),

            plans_created: register_int_counter!(
                "align_scheduler_plans_created_total",
                "Submission plans recorded"
            )
            .expect("Failed to register plans_created"),

            admission_refusals: register_int_counter!(
                "align_scheduler_admission_refusals_total",
                "Planning cycles refused by admission control"
            )
            .expect("Failed to register admission_refusals"),

            submissions: register_int_counter!(
                "align_scheduler_submissions_total",
                "Array jobs accepted by the batch scheduler"
            )
            .expect("Failed to register submissions"),

            submission_retries: register_int_counter!(
                "align_scheduler_submission_retries_total",
                "Submission attempts retried after a scheduler error"
            )
            .expect("Failed to register submission_retries"),

            submission_failures: register_int_counter!(
                "align_scheduler_submission_failures_total",
                "Chunks released after exhausting submission retries"
            )
            .expect("Failed to register submission_failures"),

            telemetry_errors: register_int_counter_vec!(
                "align_scheduler_telemetry_errors_total",
                "Sub-readings recorded as unknown",
                &["reading"]
            )
            .expect("Failed to register telemetry_errors"),

            status_conflicts: register_int_counter!(
                "align_scheduler_status_conflicts_total",
                "Backward status updates rejected by the tracker"
            )
            .expect("Failed to register status_conflicts"),

            telemetry_latency_seconds: register_histogram!(
                "align_scheduler_telemetry_latency_seconds",
                "Time spent capturing a resource snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register telemetry_latency_seconds"),

            cycle_latency_seconds: register_histogram!(
                "align_scheduler_cycle_latency_seconds",
                "Time spent in one control cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),
        }
    }
}

/// Handle to the process-wide scheduler metrics; clones share one registration
#[derive(Clone)]
pub struct SchedulerMetrics {
    _private: (),
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SchedulerMetricsInner {
        GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new)
    }

    /// Export per-resource levels and storage usage from an assessment
    pub fn record_assessment(&self, assessment: &RiskAssessment, storage_percent: Option<f64>) {
        let inner = self.inner();
        for risk in &assessment.resources {
            inner
                .risk_level
                .with_label_values(&[risk.resource.label().as_str()])
                .set(risk.level.as_gauge());
        }
        inner
            .risk_level
            .with_label_values(&["overall"])
            .set(assessment.overall.as_gauge());
        if let Some(percent) = storage_percent {
            inner.storage_percent_used.set(percent);
        }
    }

    pub fn set_chunk_size(&self, size: usize) {
        self.inner().chunk_size.set(size as i64);
    }

    pub fn record_summary(&self, summary: &TrackerSummary) {
        for status in SampleStatus::ALL {
            self.inner()
                .samples
                .with_label_values(&[status.as_str()])
                .set(summary.count(status) as i64);
        }
    }

    pub fn inc_plans_created(&self, count: usize) {
        self.inner().plans_created.inc_by(count as u64);
    }

    pub fn inc_admission_refusals(&self) {
        self.inner().admission_refusals.inc();
    }

    pub fn inc_submissions(&self) {
        self.inner().submissions.inc();
    }

    pub fn inc_submission_retries(&self) {
        self.inner().submission_retries.inc();
    }

    pub fn inc_submission_failures(&self) {
        self.inner().submission_failures.inc();
    }

    pub fn inc_telemetry_errors(&self, reading: &str) {
        self.inner()
            .telemetry_errors
            .with_label_values(&[reading])
            .inc();
    }

    pub fn inc_status_conflicts(&self, count: usize) {
        self.inner().status_conflicts.inc_by(count as u64);
    }

    pub fn observe_telemetry_latency(&self, duration_secs: f64) {
        self.inner().telemetry_latency_seconds.observe(duration_secs);
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for scheduling events
#[derive(Clone)]
pub struct StructuredLogger {
    cluster: String,
}

impl StructuredLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn log_risk_assessed(&self, assessment: &RiskAssessment) {
        let elevated: Vec<String> = assessment
            .resources
            .iter()
            .filter(|r| r.level > RiskLevel::Low)
            .map(|r| format!("{}={}", r.resource, r.level))
            .collect();
        let tte_secs = assessment.storage_time_to_exhaustion.map(|d| d.as_secs());

        info!(
            event = "risk_assessed",
            cluster = %self.cluster,
            overall = %assessment.overall,
            elevated = ?elevated,
            storage_time_to_exhaustion_secs = ?tte_secs,
            storage_growth_bytes_per_sec = ?assessment.storage_growth_bytes_per_sec,
            "Risk assessed"
        );
    }

    pub fn log_admission_refused(&self, refusal: &AdmissionRefusal) {
        let blocking: Vec<String> = refusal.blocking.iter().map(ResourceKind::label).collect();
        warn!(
            event = "admission_refused",
            cluster = %self.cluster,
            level = %refusal.level,
            blocking = ?blocking,
            refused_chunk_size = refusal.refused_chunk_size,
            pending_samples = refusal.pending_samples,
            mitigations = ?refusal.mitigations,
            "Admission refused, no submissions until re-assessed"
        );
    }

    pub fn log_chunk_submitted(
        &self,
        chunk_id: &str,
        job_id: &str,
        queue: &str,
        array_size: usize,
        success_probability: f64,
    ) {
        info!(
            event = "chunk_submitted",
            cluster = %self.cluster,
            chunk_id = %chunk_id,
            job_id = %job_id,
            queue = %queue,
            array_size = array_size,
            success_probability = success_probability,
            "Chunk submitted"
        );
    }

    pub fn log_submission_failed(&self, chunk_id: &str, attempts: u32, reason: &str) {
        error!(
            event = "submission_failed",
            cluster = %self.cluster,
            chunk_id = %chunk_id,
            attempts = attempts,
            reason = %reason,
            "Chunk submission failed, samples returned to pending"
        );
    }

    pub fn log_chunk_withdrawn(&self, chunk_id: &str, planned_risk: RiskLevel, reason: &str) {
        warn!(
            event = "chunk_withdrawn",
            cluster = %self.cluster,
            chunk_id = %chunk_id,
            planned_risk = %planned_risk,
            reason = %reason,
            "Planned chunk withdrawn for re-planning"
        );
    }

    pub fn log_status_conflict(&self, chunk_id: &str, conflicts: usize) {
        warn!(
            event = "status_conflict",
            cluster = %self.cluster,
            chunk_id = %chunk_id,
            conflicts = conflicts,
            "Rejected backward status updates from scheduler report"
        );
    }

    pub fn log_sample_input_missing(&self, chunk_id: &str, sample_id: &str, path: &str) {
        warn!(
            event = "sample_input_missing",
            cluster = %self.cluster,
            chunk_id = %chunk_id,
            sample_id = %sample_id,
            path = %path,
            "Input missing, sample failed and excluded from chunk"
        );
    }

    pub fn log_startup(&self, version: &str, samples: usize) {
        info!(
            event = "startup",
            cluster = %self.cluster,
            version = %version,
            samples = samples,
            "Alignment scheduler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "shutdown",
            cluster = %self.cluster,
            reason = %reason,
            "Alignment scheduler shutting down"
        );
    }
}
