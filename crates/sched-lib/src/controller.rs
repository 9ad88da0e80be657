//! Periodic control loop
//!
//! One cycle captures telemetry, re-assesses risk, polls submitted chunks,
//! sizes and plans the pending samples and, unless running dry, submits the
//! planned chunks. Admission is decided from the fresh assessment every
//! cycle: a refusal stops submission of the planned backlog too, and planned
//! chunks the new assessment no longer supports are withdrawn and re-planned.
//! Cycles never overlap; a failed cycle is logged and the next tick starts
//! fresh.

use crate::collector::{SnapshotHistory, TelemetrySource};
use crate::config::{ChunkConfig, ResourceConfig};
use crate::error::{AdmissionRefusal, Result, SchedError};
use crate::health::{components, HealthRegistry};
use crate::models::{average_input_bytes, RiskAssessment, RiskLevel, SubmissionPlan};
use crate::observability::{SchedulerMetrics, StructuredLogger};
use crate::planner::{decide_chunk_size, ChunkDecision, SubmissionPlanner};
use crate::risk::RiskEngine;
use crate::scheduler::BatchScheduler;
use crate::submit::{
    PollSummary, SharedTracker, StatusPoller, SubmitOutcome, SubmitSettings, Submitter,
};
use crate::tracker::{ChunkRecord, ChunkState, TrackerSummary};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Configuration for the control loop
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Time between cycles (default: 5 minutes)
    pub interval: Duration,
    /// Submit planned chunks; `false` plans only
    pub auto_submit: bool,
    pub max_submissions_per_cycle: usize,
    /// Where the snapshot history is persisted
    pub history_path: Option<PathBuf>,
    /// Manifest rewritten with current statuses after each cycle
    pub manifest_path: Option<PathBuf>,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            auto_submit: true,
            max_submissions_per_cycle: 10,
            history_path: None,
            manifest_path: None,
        }
    }
}

/// Compact view of a recorded plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub chunk_id: String,
    pub queue: String,
    pub array_size: usize,
    pub success_probability: f64,
    pub risk: RiskLevel,
}

impl From<&SubmissionPlan> for PlanSummary {
    fn from(plan: &SubmissionPlan) -> Self {
        Self {
            chunk_id: plan.chunk.chunk_id.clone(),
            queue: plan.resources.queue.clone(),
            array_size: plan.array_size(),
            success_probability: plan.success_probability,
            risk: plan.risk,
        }
    }
}

/// Outcome of one control cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub assessment: RiskAssessment,
    /// `None` when no samples were waiting for submission
    pub decision: Option<ChunkDecision>,
    /// Planned chunks dropped because the fresh assessment no longer supports them
    pub withdrawn: Vec<String>,
    pub plans: Vec<PlanSummary>,
    pub submissions: Vec<SubmitOutcome>,
    pub submission_errors: Vec<String>,
    pub refusal: Option<AdmissionRefusal>,
    pub poll: PollSummary,
    pub summary: TrackerSummary,
    pub duration_ms: u64,
}

/// Latest cycle report, shared with the operator endpoints
pub type SharedReport = Arc<RwLock<Option<CycleReport>>>;

pub struct ControlLoop {
    telemetry: Arc<dyn TelemetrySource>,
    engine: RiskEngine,
    chunk_config: ChunkConfig,
    planner: SubmissionPlanner,
    submitter: Submitter,
    poller: StatusPoller,
    tracker: SharedTracker,
    history: SnapshotHistory,
    config: ControlLoopConfig,
    health: HealthRegistry,
    metrics: SchedulerMetrics,
    logger: StructuredLogger,
    latest: SharedReport,
    cycle: u64,
}

impl ControlLoop {
    pub fn new(
        resources: &ResourceConfig,
        telemetry: Arc<dyn TelemetrySource>,
        scheduler: Arc<dyn BatchScheduler>,
        tracker: SharedTracker,
        submit: SubmitSettings,
        config: ControlLoopConfig,
        logger: StructuredLogger,
    ) -> Self {
        let query_timeout = submit.call_timeout;
        let history = match &config.history_path {
            Some(path) => SnapshotHistory::load_or_new(path, resources.trend.history_capacity),
            None => SnapshotHistory::new(resources.trend.history_capacity),
        };

        Self {
            telemetry,
            engine: RiskEngine::new(resources),
            chunk_config: resources.chunk.clone(),
            planner: SubmissionPlanner::new(resources),
            submitter: Submitter::new(scheduler.clone(), submit, logger.clone()),
            poller: StatusPoller::new(scheduler, query_timeout, logger.clone()),
            tracker,
            history,
            config,
            health: HealthRegistry::new(),
            metrics: SchedulerMetrics::new(),
            logger,
            latest: Arc::new(RwLock::new(None)),
            cycle: 0,
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    /// Publish cycle reports into an existing handle
    pub fn with_report_handle(mut self, latest: SharedReport) -> Self {
        self.latest = latest;
        self
    }

    pub fn report_handle(&self) -> SharedReport {
        self.latest.clone()
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    /// Run cycles on the configured interval until shutdown
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            auto_submit = self.config.auto_submit,
            "Starting control loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(cycle = self.cycle, error = %e, "Control cycle failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down control loop");
                    break;
                }
            }
        }
    }

    /// Run one full cycle
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let start = Instant::now();
        self.cycle += 1;

        let assessment = self.observe().await;
        let poll = self.poller.poll_active(&self.tracker).await;
        if poll.query_failures > 0 {
            self.health
                .set_degraded(
                    components::SCHEDULER,
                    format!("{} status queries failed", poll.query_failures),
                )
                .await;
        }

        // Planned-but-unsubmitted samples count too: the backlog is re-admitted every cycle
        let waiting = self.tracker.read().await.unsubmitted_samples();
        let mut decision = None;
        let mut refusal = None;
        let mut withdrawn = Vec::new();
        let mut plans = Vec::new();

        if !waiting.is_empty() {
            let chosen = decide_chunk_size(
                waiting.len(),
                average_input_bytes(&waiting),
                &assessment,
                &self.chunk_config,
            );
            self.metrics.set_chunk_size(chosen.size);
            decision = Some(chosen);

            match self
                .planner
                .check_admission(&assessment, chosen.size, waiting.len())
            {
                Ok(()) => {
                    self.health.set_healthy(components::PLANNER).await;
                    withdrawn = self.withdraw_stale(&assessment, chosen.size).await?;
                    plans = self.plan_pending(&assessment, chosen.size).await?;
                }
                Err(SchedError::AdmissionRefused(refused)) => {
                    self.logger.log_admission_refused(&refused);
                    self.metrics.inc_admission_refusals();
                    self.health
                        .set_degraded(components::PLANNER, refused.to_string())
                        .await;
                    refusal = Some(*refused);
                }
                Err(e) => return Err(e),
            }
        }

        let (submissions, submission_errors) = if self.config.auto_submit && refusal.is_none() {
            self.submit_planned().await
        } else {
            (Vec::new(), Vec::new())
        };

        if let Some(path) = &self.config.manifest_path {
            if let Err(e) = self.tracker.read().await.sync_manifest(path) {
                warn!(path = %path.display(), error = %e, "Failed to sync manifest");
            }
        }

        let summary = self.tracker.read().await.summary();
        self.metrics.record_summary(&summary);

        let elapsed = start.elapsed();
        self.metrics.observe_cycle_latency(elapsed.as_secs_f64());

        let report = CycleReport {
            cycle: self.cycle,
            assessment,
            decision,
            withdrawn,
            plans,
            submissions,
            submission_errors,
            refusal,
            poll,
            summary,
            duration_ms: elapsed.as_millis() as u64,
        };

        debug!(
            cycle = report.cycle,
            withdrawn = report.withdrawn.len(),
            plans = report.plans.len(),
            submissions = report.submissions.len(),
            refused = report.refusal.is_some(),
            elapsed_ms = report.duration_ms,
            "Control cycle complete"
        );

        *self.latest.write().await = Some(report.clone());
        Ok(report)
    }

    /// Capture a snapshot, extend the history and assess it
    async fn observe(&mut self) -> RiskAssessment {
        let capture_start = Instant::now();
        let snapshot = self.telemetry.capture().await;
        self.metrics
            .observe_telemetry_latency(capture_start.elapsed().as_secs_f64());

        let unknown = snapshot.unknown_readings();
        for reading in &unknown {
            self.metrics.inc_telemetry_errors(reading);
        }
        if unknown.is_empty() {
            self.health.set_healthy(components::TELEMETRY).await;
        } else {
            self.health
                .set_degraded(
                    components::TELEMETRY,
                    format!("unknown readings: {}", unknown.join(", ")),
                )
                .await;
        }

        let storage_percent = snapshot.storage.map(|s| s.percent_used());
        self.history.push(snapshot);
        if let Some(path) = &self.config.history_path {
            if let Err(e) = self.history.save(path) {
                warn!(path = %path.display(), error = %e, "Failed to save snapshot history");
            }
        }

        let assessment = self.engine.assess(self.history.as_slice());
        self.metrics.record_assessment(&assessment, storage_percent);
        self.logger.log_risk_assessed(&assessment);
        self.health.set_healthy(components::RISK_ENGINE).await;
        assessment
    }

    /// Withdraw planned chunks the current assessment no longer supports
    async fn withdraw_stale(
        &self,
        assessment: &RiskAssessment,
        chunk_size: usize,
    ) -> Result<Vec<String>> {
        let stale: Vec<(String, RiskLevel, &'static str)> = self
            .tracker
            .read()
            .await
            .chunks_in(ChunkState::Planned)
            .into_iter()
            .filter_map(|chunk| {
                self.stale_reason(chunk, assessment, chunk_size)
                    .map(|reason| (chunk.chunk_id.clone(), chunk.risk, reason))
            })
            .collect();

        let mut withdrawn = Vec::with_capacity(stale.len());
        for (chunk_id, planned_risk, reason) in stale {
            let result = self.tracker.write().await.withdraw_chunk(&chunk_id);
            self.check_tracker(result).await?;
            self.logger.log_chunk_withdrawn(&chunk_id, planned_risk, reason);
            withdrawn.push(chunk_id);
        }
        Ok(withdrawn)
    }

    fn stale_reason(
        &self,
        chunk: &ChunkRecord,
        assessment: &RiskAssessment,
        chunk_size: usize,
    ) -> Option<&'static str> {
        if chunk.risk < assessment.overall {
            Some("risk rose since planning")
        } else if chunk.sample_ids.len() > chunk_size {
            Some("larger than the current chunk size")
        } else if !self.planner.queue_admits(&chunk.queue, assessment) {
            Some("queue no longer admits work")
        } else {
            None
        }
    }

    /// Plan and record the samples no live chunk owns
    async fn plan_pending(
        &self,
        assessment: &RiskAssessment,
        chunk_size: usize,
    ) -> Result<Vec<PlanSummary>> {
        let (pending, first_index) = {
            let tracker = self.tracker.read().await;
            (tracker.pending_samples(), tracker.next_chunk_index())
        };
        let new_plans = self
            .planner
            .plan_from(&pending, chunk_size, assessment, first_index)?;

        let mut recorded_plans = Vec::with_capacity(new_plans.len());
        for plan in &new_plans {
            let recorded = self.tracker.write().await.record_plan(plan);
            self.check_tracker(recorded).await?;
            recorded_plans.push(PlanSummary::from(plan));
        }
        self.metrics.inc_plans_created(new_plans.len());
        Ok(recorded_plans)
    }

    /// Submit planned chunks, oldest first, up to the per-cycle bound
    async fn submit_planned(&self) -> (Vec<SubmitOutcome>, Vec<String>) {
        let chunk_ids: Vec<String> = self
            .tracker
            .read()
            .await
            .chunks_in(ChunkState::Planned)
            .into_iter()
            .take(self.config.max_submissions_per_cycle)
            .map(|c| c.chunk_id.clone())
            .collect();

        let mut outcomes = Vec::new();
        let mut errors = Vec::new();
        for chunk_id in chunk_ids {
            match self.submitter.submit_chunk(&self.tracker, &chunk_id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(chunk_id = %chunk_id, error = %e, "Chunk not submitted");
                    errors.push(e.to_string());
                }
            }
        }

        if errors.is_empty() {
            self.health.set_healthy(components::SCHEDULER).await;
        } else {
            self.health
                .set_degraded(
                    components::SCHEDULER,
                    format!("{} chunks not submitted", errors.len()),
                )
                .await;
        }
        (outcomes, errors)
    }

    /// Mark the tracker unhealthy when it fails to persist
    async fn check_tracker(&self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.health.set_healthy(components::TRACKER).await;
                Ok(())
            }
            Err(e @ SchedError::Other(_)) => {
                self.health
                    .set_unhealthy(components::TRACKER, e.to_string())
                    .await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::async_trait;
    use crate::health::ComponentStatus;
    use crate::models::{
        CpuReading, MemoryReading, QueueReading, ResourceSnapshot, Sample, SampleStatus,
        StorageReading,
    };
    use crate::scheduler::{ArrayStatusReport, JobId, JobRequest};
    use crate::tracker::StateTracker;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const TB: u64 = 1_000_000_000_000;

    /// Replays a fixed storage fill level with ample CPU, memory and queues
    struct FixedTelemetry {
        used_percent: Mutex<u64>,
        /// Running jobs on `normal`, out of 500 slots
        normal_running: Mutex<u32>,
        clock: AtomicU32,
    }

    impl FixedTelemetry {
        fn new(used_percent: u64) -> Self {
            Self {
                used_percent: Mutex::new(used_percent),
                normal_running: Mutex::new(10),
                clock: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TelemetrySource for FixedTelemetry {
        async fn capture(&self) -> ResourceSnapshot {
            let tick = self.clock.fetch_add(1, Ordering::SeqCst) as i64;
            let used = *self.used_percent.lock().unwrap();
            let normal_running = *self.normal_running.lock().unwrap();
            ResourceSnapshot {
                captured_at: 1_700_000_000 + tick * 300,
                storage: Some(StorageReading::new(100 * TB, used * TB)),
                cpu: Some(CpuReading {
                    cpu_count: 64,
                    load_avg: 8.0,
                }),
                memory: Some(MemoryReading {
                    total_bytes: 1024 * 1024 * 1024 * 1024,
                    available_bytes: 900 * 1024 * 1024 * 1024,
                }),
                queues: Some(vec![
                    QueueReading {
                        name: "normal".to_string(),
                        pending: 0,
                        running: normal_running,
                        slot_limit: Some(500),
                    },
                    QueueReading {
                        name: "long".to_string(),
                        pending: 0,
                        running: 5,
                        slot_limit: Some(200),
                    },
                    QueueReading {
                        name: "hiprio".to_string(),
                        pending: 0,
                        running: 1,
                        slot_limit: Some(50),
                    },
                ]),
            }
        }
    }

    #[derive(Default)]
    struct RecordingScheduler {
        submits: AtomicU32,
        requests: Mutex<Vec<JobRequest>>,
    }

    #[async_trait]
    impl BatchScheduler for RecordingScheduler {
        async fn submit(&self, request: &JobRequest) -> Result<JobId> {
            let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
            self.requests.lock().unwrap().push(request.clone());
            Ok(JobId(format!("{}", 500 + n)))
        }

        async fn query(&self, job: &JobId) -> Result<ArrayStatusReport> {
            Ok(ArrayStatusReport::new(job.clone()))
        }

        async fn kill(&self, _job: &JobId) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        dir: TempDir,
        tracker: SharedTracker,
        scheduler: Arc<RecordingScheduler>,
        telemetry: Arc<FixedTelemetry>,
        health: HealthRegistry,
    }

    fn harness(samples: usize, used_percent: u64) -> Harness {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();

        let samples: Vec<Sample> = (0..samples)
            .map(|i| {
                let r1 = data.join(format!("S{:05}_R1_001.fastq.gz", i));
                let r2 = data.join(format!("S{:05}_R2_001.fastq.gz", i));
                std::fs::write(&r1, b"@").unwrap();
                std::fs::write(&r2, b"@").unwrap();
                Sample {
                    sample_id: format!("S{:05}", i),
                    r1_path: r1,
                    r2_path: r2,
                    r1_size_bytes: 150_000,
                    r2_size_bytes: 150_000,
                    status: SampleStatus::Pending,
                }
            })
            .collect();

        let tracker = StateTracker::open(dir.path().join("state.json"), samples).unwrap();
        Harness {
            dir,
            tracker: Arc::new(RwLock::new(tracker)),
            scheduler: Arc::new(RecordingScheduler::default()),
            telemetry: Arc::new(FixedTelemetry::new(used_percent)),
            health: HealthRegistry::new(),
        }
    }

    fn control_loop(h: &Harness, auto_submit: bool) -> ControlLoop {
        let submit = SubmitSettings {
            chunk_dir: h.dir.path().join("chunks"),
            log_dir: h.dir.path().join("logs"),
            retry: Default::default(),
            call_timeout: Duration::from_secs(5),
        };
        let config = ControlLoopConfig {
            auto_submit,
            max_submissions_per_cycle: 2,
            history_path: Some(h.dir.path().join("history.json")),
            manifest_path: Some(h.dir.path().join("manifest.csv")),
            ..Default::default()
        };
        ControlLoop::new(
            &ResourceConfig::default(),
            h.telemetry.clone(),
            h.scheduler.clone(),
            h.tracker.clone(),
            submit,
            config,
            StructuredLogger::new("test"),
        )
        .with_health(h.health.clone())
    }

    #[tokio::test]
    async fn test_low_risk_cycle_plans_and_submits() {
        let h = harness(2_500, 40);
        let mut control = control_loop(&h, true);

        let report = control.run_cycle().await.unwrap();

        assert_eq!(report.assessment.overall, RiskLevel::Low);
        assert_eq!(report.decision.unwrap().size, 1_000);
        let sizes: Vec<usize> = report.plans.iter().map(|p| p.array_size).collect();
        assert_eq!(sizes, vec![1_000, 1_000, 500]);
        assert_eq!(report.submissions.len(), 2);
        assert_eq!(h.scheduler.submits.load(Ordering::SeqCst), 2);
        assert_eq!(report.summary.submitted, 2_000);

        // The third chunk goes out on the next cycle without re-planning
        let report = control.run_cycle().await.unwrap();
        assert!(report.plans.is_empty());
        assert_eq!(report.submissions.len(), 1);
        assert_eq!(report.summary.pending, 0);
        assert!(control.report_handle().read().await.is_some());
        assert_eq!(control.history().len(), 2);
        assert!(h.dir.path().join("history.json").exists());
        assert!(h.dir.path().join("manifest.csv").exists());
    }

    #[tokio::test]
    async fn test_critical_storage_refuses_admission() {
        let h = harness(300, 96);
        let mut control = control_loop(&h, true);

        let report = control.run_cycle().await.unwrap();

        assert_eq!(report.assessment.overall, RiskLevel::Critical);
        let refusal = report.refusal.expect("refusal");
        assert_eq!(refusal.pending_samples, 300);
        assert!(report.plans.is_empty());
        assert!(report.submissions.is_empty());
        assert_eq!(h.scheduler.submits.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.health.status_of(components::PLANNER).await,
            Some(ComponentStatus::Degraded)
        );

        // Space freed: the next cycle re-assesses and plans again
        *h.telemetry.used_percent.lock().unwrap() = 50;
        let report = control.run_cycle().await.unwrap();
        assert!(report.refusal.is_none());
        assert!(!report.plans.is_empty());
    }

    #[tokio::test]
    async fn test_critical_storage_holds_planned_backlog() {
        let h = harness(5_000, 40);
        let mut control = control_loop(&h, true);

        let report = control.run_cycle().await.unwrap();
        assert_eq!(report.plans.len(), 5);
        assert_eq!(report.submissions.len(), 2);

        // Nothing is pending any more, but three planned chunks wait for submission
        *h.telemetry.used_percent.lock().unwrap() = 96;
        let report = control.run_cycle().await.unwrap();

        assert_eq!(report.assessment.overall, RiskLevel::Critical);
        let refusal = report.refusal.expect("refusal");
        assert_eq!(refusal.pending_samples, 3_000);
        assert!(report.submissions.is_empty());
        assert!(report.withdrawn.is_empty());
        assert_eq!(h.scheduler.submits.load(Ordering::SeqCst), 2);
        assert_eq!(
            h.tracker.read().await.chunks_in(ChunkState::Planned).len(),
            3
        );
    }

    #[tokio::test]
    async fn test_rising_risk_replans_backlog_before_submission() {
        let h = harness(5_000, 40);
        let mut control = control_loop(&h, true);

        let report = control.run_cycle().await.unwrap();
        assert_eq!(report.assessment.overall, RiskLevel::Low);
        assert_eq!(report.plans.len(), 5);
        assert!(report.plans.iter().all(|p| p.queue == "normal"));

        // `normal` at 85% occupancy puts the cluster at HIGH
        *h.telemetry.normal_running.lock().unwrap() = 425;
        let report = control.run_cycle().await.unwrap();

        assert_eq!(report.assessment.overall, RiskLevel::High);
        assert_eq!(report.decision.unwrap().size, 500);
        assert_eq!(report.withdrawn, vec!["chunk_003", "chunk_004", "chunk_005"]);
        assert_eq!(report.plans.len(), 6);
        assert!(report
            .plans
            .iter()
            .all(|p| p.array_size == 500 && p.risk == RiskLevel::High));

        let requests = h.scheduler.requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        for request in &requests[2..] {
            assert_eq!(request.array_size, 500);
            assert_eq!(request.queue, "hiprio");
        }
        drop(requests);

        let tracker = h.tracker.read().await;
        assert_eq!(tracker.chunks_in(ChunkState::Withdrawn).len(), 3);
        assert_eq!(tracker.summary().submitted, 3_000);
    }

    #[tokio::test]
    async fn test_dry_run_plans_without_submitting() {
        let h = harness(10, 40);
        let mut control = control_loop(&h, false);

        let report = control.run_cycle().await.unwrap();

        assert_eq!(report.plans.len(), 1);
        assert!(report.submissions.is_empty());
        assert_eq!(h.scheduler.submits.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.tracker.read().await.chunks_in(ChunkState::Planned).len(),
            1
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness(0, 40);
        let control = control_loop(&h, true);
        let report = control.report_handle();
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(control.run(rx));
        // The first tick fires immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        let report = report.read().await;
        let report = report.as_ref().expect("first cycle report");
        assert_eq!(report.cycle, 1);
        assert!(report.decision.is_none());
    }
}
