//! Submission, cancellation and status polling against the batch scheduler
//!
//! These are the control loop's suspension points. Each scheduler call is
//! bounded by a timeout; a timeout counts as a retryable scheduler error.
//! The tracker lock is never held across a scheduler call.

use crate::config::RetryPolicy;
use crate::error::{Result, SchedError};
use crate::manifest;
use crate::observability::{SchedulerMetrics, StructuredLogger};
use crate::scheduler::{BatchScheduler, JobId, JobRequest};
use crate::tracker::{ChunkState, ReportOutcome, StateTracker};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Shared handle to the tracker
pub type SharedTracker = Arc<RwLock<StateTracker>>;

#[derive(Debug, Clone)]
pub struct SubmitSettings {
    /// Where per-chunk manifests are written
    pub chunk_dir: PathBuf,
    pub log_dir: PathBuf,
    pub retry: RetryPolicy,
    /// Bound for each scheduler call
    pub call_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Submitted {
        chunk_id: String,
        job_id: JobId,
        array_size: usize,
        attempts: u32,
        /// Samples failed for missing input before submission
        excluded: Vec<String>,
    },
    /// Every member's input was missing; the chunk was withdrawn
    Emptied { chunk_id: String, excluded: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    Withdrawn { chunk_id: String },
    Killed { chunk_id: String, job_id: JobId, failed_samples: usize },
}

async fn bounded<T>(
    timeout: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, call).await.map_err(|_| {
        SchedError::Scheduler(format!("{} timed out after {}ms", what, timeout.as_millis()))
    })?
}

pub struct Submitter {
    scheduler: Arc<dyn BatchScheduler>,
    settings: SubmitSettings,
    logger: StructuredLogger,
    metrics: SchedulerMetrics,
}

impl Submitter {
    pub fn new(
        scheduler: Arc<dyn BatchScheduler>,
        settings: SubmitSettings,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            scheduler,
            settings,
            logger,
            metrics: SchedulerMetrics::new(),
        }
    }

    /// Submit a planned chunk
    ///
    /// Members whose inputs are missing are failed and dropped first. The
    /// scheduler call is retried with backoff; once retries are exhausted
    /// the chunk is released so its samples are pending again, and
    /// [`SchedError::SubmissionFailed`] is returned.
    pub async fn submit_chunk(&self, tracker: &SharedTracker, chunk_id: &str) -> Result<SubmitOutcome> {
        let members = {
            let tracker = tracker.read().await;
            let chunk = tracker
                .chunk(chunk_id)
                .ok_or_else(|| SchedError::UnknownChunk(chunk_id.to_string()))?;
            if chunk.state != ChunkState::Planned {
                return Err(SchedError::ChunkConflict {
                    chunk_id: chunk_id.to_string(),
                    reason: format!("cannot submit a {} chunk", chunk.state.as_str()),
                });
            }
            tracker.chunk_samples(chunk_id)?
        };

        let mut missing = Vec::new();
        for sample in &members {
            if let Some(path) = first_missing_input(sample).await {
                let error = SchedError::SampleInputMissing {
                    sample_id: sample.sample_id.clone(),
                    path: path.clone(),
                };
                debug!(error = %error, "Excluding sample from submission");
                missing.push((sample.sample_id.clone(), path));
            }
        }

        let excluded: Vec<String> = missing.iter().map(|(id, _)| id.clone()).collect();
        tracker
            .write()
            .await
            .mark_inputs_missing(chunk_id, &excluded)?;
        for (sample_id, path) in &missing {
            self.logger
                .log_sample_input_missing(chunk_id, sample_id, &path.to_string_lossy());
        }

        let (chunk, remaining) = {
            let tracker = tracker.read().await;
            let chunk = tracker
                .chunk(chunk_id)
                .cloned()
                .ok_or_else(|| SchedError::UnknownChunk(chunk_id.to_string()))?;
            (chunk, tracker.chunk_samples(chunk_id)?)
        };

        if remaining.is_empty() {
            tracker.write().await.withdraw_chunk(chunk_id)?;
            return Ok(SubmitOutcome::Emptied {
                chunk_id: chunk_id.to_string(),
                excluded,
            });
        }

        let manifest_path =
            manifest::write_chunk_manifest(&self.settings.chunk_dir, chunk_id, &remaining)?;
        tokio::fs::create_dir_all(&self.settings.log_dir)
            .await
            .with_context(|| {
                format!("Failed to create log directory {}", self.settings.log_dir.display())
            })?;
        let request = chunk.job_request(manifest_path, self.settings.log_dir.clone());

        let retry = &self.settings.retry;
        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            let result = bounded(
                self.settings.call_timeout,
                "bsub",
                self.scheduler.submit(&request),
            )
            .await;

            match result {
                Ok(job_id) => {
                    return self
                        .confirm(tracker, &chunk.sample_ids, job_id, &request, attempt, excluded)
                        .await;
                }
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let backoff = retry.backoff(attempt);
                    warn!(
                        chunk_id = chunk_id,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Submission attempt failed, retrying"
                    );
                    self.metrics.inc_submission_retries();
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => break e,
            }
        };

        let reason = last_error.to_string();
        tracker.write().await.release_chunk(chunk_id, &reason)?;
        self.metrics.inc_submission_failures();
        self.logger.log_submission_failed(chunk_id, attempt, &reason);

        Err(SchedError::SubmissionFailed {
            chunk_id: chunk_id.to_string(),
            attempts: attempt,
            reason,
        })
    }

    /// Record acceptance
    ///
    /// A chunk that was withdrawn, or whose members changed, while the call
    /// was in flight no longer matches the job's manifest; the job is killed.
    async fn confirm(
        &self,
        tracker: &SharedTracker,
        submitted: &[String],
        job_id: JobId,
        request: &JobRequest,
        attempts: u32,
        excluded: Vec<String>,
    ) -> Result<SubmitOutcome> {
        let chunk_id = request.job_name.as_str();
        let (recorded, success_probability) = {
            let mut tracker = tracker.write().await;
            let recorded = match tracker.chunk(chunk_id) {
                Some(chunk) if chunk.sample_ids != submitted => Err(SchedError::ChunkConflict {
                    chunk_id: chunk_id.to_string(),
                    reason: "members changed during submission".to_string(),
                }),
                _ => tracker.mark_submitted(chunk_id, &job_id),
            };
            let probability = tracker
                .chunk(chunk_id)
                .map(|c| c.success_probability)
                .unwrap_or_default();
            (recorded, probability)
        };

        if let Err(e) = recorded {
            warn!(
                chunk_id = chunk_id,
                job_id = %job_id,
                error = %e,
                "Chunk closed during submission, killing the job"
            );
            if let Err(kill_err) =
                bounded(self.settings.call_timeout, "bkill", self.scheduler.kill(&job_id)).await
            {
                warn!(job_id = %job_id, error = %kill_err, "Failed to kill orphaned job");
            }
            return Err(e);
        }

        self.metrics.inc_submissions();
        self.logger.log_chunk_submitted(
            chunk_id,
            &job_id.0,
            &request.queue,
            request.array_size,
            success_probability,
        );

        Ok(SubmitOutcome::Submitted {
            chunk_id: chunk_id.to_string(),
            job_id,
            array_size: request.array_size,
            attempts,
            excluded,
        })
    }

    /// Withdraw a planned chunk, or kill a submitted one and fail its unfinished samples
    pub async fn cancel_chunk(&self, tracker: &SharedTracker, chunk_id: &str) -> Result<CancelOutcome> {
        let (state, job_id) = {
            let tracker = tracker.read().await;
            let chunk = tracker
                .chunk(chunk_id)
                .ok_or_else(|| SchedError::UnknownChunk(chunk_id.to_string()))?;
            (chunk.state, chunk.job_id.clone())
        };

        match (state, job_id) {
            (ChunkState::Planned, _) => {
                tracker.write().await.withdraw_chunk(chunk_id)?;
                Ok(CancelOutcome::Withdrawn {
                    chunk_id: chunk_id.to_string(),
                })
            }
            (ChunkState::Submitted, Some(job_id)) => {
                let job_id = JobId(job_id);
                bounded(self.settings.call_timeout, "bkill", self.scheduler.kill(&job_id)).await?;
                let failed_samples = tracker.write().await.mark_cancelled(chunk_id)?;
                Ok(CancelOutcome::Killed {
                    chunk_id: chunk_id.to_string(),
                    job_id,
                    failed_samples,
                })
            }
            (state, _) => Err(SchedError::ChunkConflict {
                chunk_id: chunk_id.to_string(),
                reason: format!("cannot cancel a {} chunk", state.as_str()),
            }),
        }
    }
}

async fn first_missing_input(sample: &crate::models::Sample) -> Option<PathBuf> {
    for path in [&sample.r1_path, &sample.r2_path] {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Some(path.clone());
        }
    }
    None
}

/// Totals from polling every active chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollSummary {
    pub polled: usize,
    pub updated: usize,
    pub conflicts: usize,
    pub query_failures: usize,
}

/// Drives tracker updates from scheduler status queries
pub struct StatusPoller {
    scheduler: Arc<dyn BatchScheduler>,
    query_timeout: Duration,
    logger: StructuredLogger,
    metrics: SchedulerMetrics,
}

impl StatusPoller {
    pub fn new(
        scheduler: Arc<dyn BatchScheduler>,
        query_timeout: Duration,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            scheduler,
            query_timeout,
            logger,
            metrics: SchedulerMetrics::new(),
        }
    }

    /// Query one submitted chunk and apply the report
    ///
    /// A failed query leaves the tracker untouched.
    pub async fn poll(&self, tracker: &SharedTracker, chunk_id: &str) -> Result<ReportOutcome> {
        let job_id = {
            let tracker = tracker.read().await;
            let chunk = tracker
                .chunk(chunk_id)
                .ok_or_else(|| SchedError::UnknownChunk(chunk_id.to_string()))?;
            chunk
                .job_id
                .clone()
                .map(JobId)
                .ok_or_else(|| SchedError::ChunkConflict {
                    chunk_id: chunk_id.to_string(),
                    reason: "chunk has no job id".to_string(),
                })?
        };

        let report = bounded(self.query_timeout, "bjobs", self.scheduler.query(&job_id)).await?;
        let outcome = tracker.write().await.apply_array_report(chunk_id, &report)?;

        if outcome.conflicts > 0 {
            self.metrics.inc_status_conflicts(outcome.conflicts);
            self.logger.log_status_conflict(chunk_id, outcome.conflicts);
        }
        Ok(outcome)
    }

    /// Poll every submitted chunk that still has unfinished samples
    pub async fn poll_active(&self, tracker: &SharedTracker) -> PollSummary {
        let chunk_ids: Vec<String> = tracker
            .read()
            .await
            .active_chunks()
            .into_iter()
            .map(|c| c.chunk_id.clone())
            .collect();

        let mut summary = PollSummary::default();
        for chunk_id in chunk_ids {
            summary.polled += 1;
            match self.poll(tracker, &chunk_id).await {
                Ok(outcome) => {
                    summary.updated += outcome.updated;
                    summary.conflicts += outcome.conflicts;
                }
                Err(e) => {
                    summary.query_failures += 1;
                    warn!(chunk_id = %chunk_id, error = %e, "Status query failed, state unchanged");
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::models::{CapacityHeadroom, RiskAssessment, RiskLevel, Sample, SampleStatus};
    use crate::planner::SubmissionPlanner;
    use crate::scheduler::{ArrayStatusReport, ArrayTaskState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scheduler stub failing the first `failures` submissions
    #[derive(Default)]
    struct FakeScheduler {
        failures: u32,
        submits: AtomicU32,
        kills: Mutex<Vec<JobId>>,
        requests: Mutex<Vec<JobRequest>>,
        report: Mutex<Option<ArrayStatusReport>>,
    }

    #[async_trait]
    impl BatchScheduler for FakeScheduler {
        async fn submit(&self, request: &JobRequest) -> Result<JobId> {
            let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
            self.requests.lock().unwrap().push(request.clone());
            if n <= self.failures {
                return Err(SchedError::Scheduler("LSF daemon not responding".to_string()));
            }
            Ok(JobId(format!("{}", 1000 + n)))
        }

        async fn query(&self, _job: &JobId) -> Result<ArrayStatusReport> {
            self.report
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| SchedError::Scheduler("bjobs: not found".to_string()))
        }

        async fn kill(&self, job: &JobId) -> Result<()> {
            self.kills.lock().unwrap().push(job.clone());
            Ok(())
        }
    }

    struct Fixture {
        dir: TempDir,
        tracker: SharedTracker,
    }

    /// Tracker with `count` samples whose inputs exist on disk, planned as one chunk
    fn fixture(count: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();

        let samples: Vec<Sample> = (0..count)
            .map(|i| {
                let r1 = data.join(format!("S{}_R1_001.fastq.gz", i));
                let r2 = data.join(format!("S{}_R2_001.fastq.gz", i));
                std::fs::write(&r1, b"@r1").unwrap();
                std::fs::write(&r2, b"@r2").unwrap();
                Sample {
                    sample_id: format!("S{}", i),
                    r1_path: r1,
                    r2_path: r2,
                    r1_size_bytes: 3,
                    r2_size_bytes: 3,
                    status: SampleStatus::Pending,
                }
            })
            .collect();

        let mut tracker = StateTracker::open(dir.path().join("state.json"), samples).unwrap();
        let risk = RiskAssessment {
            overall: RiskLevel::Low,
            resources: Vec::new(),
            storage_time_to_exhaustion: None,
            storage_growth_bytes_per_sec: None,
            headroom: CapacityHeadroom::default(),
            mitigations: Vec::new(),
            assessed_at: 0,
        };
        let plan = SubmissionPlanner::new(&ResourceConfig::default())
            .plan(tracker.samples(), count, &risk)
            .unwrap()
            .remove(0);
        tracker.record_plan(&plan).unwrap();

        Fixture {
            dir,
            tracker: Arc::new(RwLock::new(tracker)),
        }
    }

    fn settings(dir: &TempDir) -> SubmitSettings {
        SubmitSettings {
            chunk_dir: dir.path().join("chunks"),
            log_dir: dir.path().join("logs"),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
            },
            call_timeout: Duration::from_secs(5),
        }
    }

    fn submitter(dir: &TempDir, scheduler: Arc<FakeScheduler>) -> Submitter {
        Submitter::new(scheduler, settings(dir), StructuredLogger::new("test"))
    }

    #[tokio::test]
    async fn test_submit_after_transient_failure() {
        let fx = fixture(4);
        let scheduler = Arc::new(FakeScheduler {
            failures: 1,
            ..Default::default()
        });

        let outcome = submitter(&fx.dir, scheduler.clone())
            .submit_chunk(&fx.tracker, "chunk_001")
            .await
            .unwrap();

        match outcome {
            SubmitOutcome::Submitted {
                attempts, array_size, ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(array_size, 4);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let tracker = fx.tracker.read().await;
        assert_eq!(tracker.chunk("chunk_001").unwrap().state, ChunkState::Submitted);
        assert_eq!(tracker.status_of("S0").unwrap(), SampleStatus::Submitted);
        assert!(fx.dir.path().join("chunks/chunk_001_manifest.csv").exists());
    }

    #[tokio::test]
    async fn test_exhausted_retries_release_samples() {
        let fx = fixture(3);
        let scheduler = Arc::new(FakeScheduler {
            failures: 10,
            ..Default::default()
        });

        let err = submitter(&fx.dir, scheduler.clone())
            .submit_chunk(&fx.tracker, "chunk_001")
            .await
            .unwrap_err();

        assert!(matches!(err, SchedError::SubmissionFailed { attempts: 3, .. }));
        assert_eq!(scheduler.submits.load(Ordering::SeqCst), 3);

        let tracker = fx.tracker.read().await;
        assert_eq!(tracker.chunk("chunk_001").unwrap().state, ChunkState::SubmitFailed);
        assert_eq!(tracker.pending_samples().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_input_excluded_without_blocking_chunk() {
        let fx = fixture(3);
        std::fs::remove_file(fx.dir.path().join("data/S1_R2_001.fastq.gz")).unwrap();
        let scheduler = Arc::new(FakeScheduler::default());

        let outcome = submitter(&fx.dir, scheduler.clone())
            .submit_chunk(&fx.tracker, "chunk_001")
            .await
            .unwrap();

        match outcome {
            SubmitOutcome::Submitted {
                array_size, excluded, ..
            } => {
                assert_eq!(array_size, 2);
                assert_eq!(excluded, vec!["S1".to_string()]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let tracker = fx.tracker.read().await;
        assert_eq!(tracker.status_of("S1").unwrap(), SampleStatus::Failed);
        let rows = manifest::read(&fx.dir.path().join("chunks/chunk_001_manifest.csv")).unwrap();
        let ids: Vec<&str> = rows.iter().map(|s| s.sample_id.as_str()).collect();
        assert_eq!(ids, vec!["S0", "S2"]);
        assert_eq!(scheduler.requests.lock().unwrap()[0].array_size, 2);
    }

    #[tokio::test]
    async fn test_reset_member_is_not_submitted_with_old_chunk() {
        let fx = fixture(3);
        fx.tracker.write().await.admin_reset("S1", "rerun").unwrap();
        let scheduler = Arc::new(FakeScheduler::default());

        let outcome = submitter(&fx.dir, scheduler.clone())
            .submit_chunk(&fx.tracker, "chunk_001")
            .await
            .unwrap();

        assert!(matches!(outcome, SubmitOutcome::Submitted { array_size: 2, .. }));
        let rows = manifest::read(&fx.dir.path().join("chunks/chunk_001_manifest.csv")).unwrap();
        let ids: Vec<&str> = rows.iter().map(|s| s.sample_id.as_str()).collect();
        assert_eq!(ids, vec!["S0", "S2"]);

        let tracker = fx.tracker.read().await;
        assert_eq!(tracker.status_of("S1").unwrap(), SampleStatus::Pending);
        assert_eq!(tracker.pending_samples().len(), 1);
    }

    /// Resets a member while its chunk's submission is in flight
    struct ResettingScheduler {
        tracker: SharedTracker,
        kills: Mutex<Vec<JobId>>,
    }

    #[async_trait]
    impl BatchScheduler for ResettingScheduler {
        async fn submit(&self, _request: &JobRequest) -> Result<JobId> {
            self.tracker.write().await.admin_reset("S0", "operator")?;
            Ok(JobId("77".to_string()))
        }

        async fn query(&self, job: &JobId) -> Result<ArrayStatusReport> {
            Ok(ArrayStatusReport::new(job.clone()))
        }

        async fn kill(&self, job: &JobId) -> Result<()> {
            self.kills.lock().unwrap().push(job.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_membership_change_during_submission_kills_job() {
        let fx = fixture(3);
        let scheduler = Arc::new(ResettingScheduler {
            tracker: fx.tracker.clone(),
            kills: Mutex::new(Vec::new()),
        });

        let submitter =
            Submitter::new(scheduler.clone(), settings(&fx.dir), StructuredLogger::new("test"));
        let err = submitter
            .submit_chunk(&fx.tracker, "chunk_001")
            .await
            .unwrap_err();

        assert!(matches!(err, SchedError::ChunkConflict { .. }));
        assert_eq!(scheduler.kills.lock().unwrap().as_slice(), &[JobId("77".to_string())]);

        // The job never counted; the shrunken chunk is still planned
        let tracker = fx.tracker.read().await;
        let chunk = tracker.chunk("chunk_001").unwrap();
        assert_eq!(chunk.state, ChunkState::Planned);
        assert_eq!(chunk.sample_ids, vec!["S1".to_string(), "S2".to_string()]);
        assert_eq!(tracker.status_of("S1").unwrap(), SampleStatus::Pending);
    }

    #[tokio::test]
    async fn test_all_inputs_missing_withdraws_chunk() {
        let fx = fixture(1);
        std::fs::remove_file(fx.dir.path().join("data/S0_R1_001.fastq.gz")).unwrap();
        let scheduler = Arc::new(FakeScheduler::default());

        let outcome = submitter(&fx.dir, scheduler.clone())
            .submit_chunk(&fx.tracker, "chunk_001")
            .await
            .unwrap();

        assert!(matches!(outcome, SubmitOutcome::Emptied { .. }));
        assert_eq!(scheduler.submits.load(Ordering::SeqCst), 0);
        assert_eq!(
            fx.tracker.read().await.chunk("chunk_001").unwrap().state,
            ChunkState::Withdrawn
        );
    }

    #[tokio::test]
    async fn test_cancel_submitted_chunk_fails_members() {
        let fx = fixture(2);
        let scheduler = Arc::new(FakeScheduler::default());
        let submitter = submitter(&fx.dir, scheduler.clone());

        submitter.submit_chunk(&fx.tracker, "chunk_001").await.unwrap();
        let outcome = submitter.cancel_chunk(&fx.tracker, "chunk_001").await.unwrap();

        assert!(matches!(
            outcome,
            CancelOutcome::Killed {
                failed_samples: 2,
                ..
            }
        ));
        assert_eq!(scheduler.kills.lock().unwrap().len(), 1);
        assert_eq!(
            fx.tracker.read().await.status_of("S1").unwrap(),
            SampleStatus::Failed
        );

        // A cancelled chunk cannot be cancelled again
        assert!(submitter.cancel_chunk(&fx.tracker, "chunk_001").await.is_err());
    }

    #[tokio::test]
    async fn test_poll_applies_partial_report() {
        let fx = fixture(3);
        let scheduler = Arc::new(FakeScheduler::default());
        submitter(&fx.dir, scheduler.clone())
            .submit_chunk(&fx.tracker, "chunk_001")
            .await
            .unwrap();

        let poller = StatusPoller::new(
            scheduler.clone(),
            Duration::from_secs(5),
            StructuredLogger::new("test"),
        );

        // Query failure leaves state unchanged
        let summary = poller.poll_active(&fx.tracker).await;
        assert_eq!(summary.query_failures, 1);
        assert_eq!(
            fx.tracker.read().await.status_of("S0").unwrap(),
            SampleStatus::Submitted
        );

        *scheduler.report.lock().unwrap() = Some(
            ArrayStatusReport::new(JobId("1001".to_string()))
                .with_task(0, ArrayTaskState::Done)
                .with_task(2, ArrayTaskState::Running),
        );
        let summary = poller.poll_active(&fx.tracker).await;
        assert_eq!(summary.polled, 1);
        assert_eq!(summary.updated, 2);

        let tracker = fx.tracker.read().await;
        assert_eq!(tracker.status_of("S0").unwrap(), SampleStatus::Completed);
        assert_eq!(tracker.status_of("S1").unwrap(), SampleStatus::Submitted);
        assert_eq!(tracker.status_of("S2").unwrap(), SampleStatus::Running);
    }
}
