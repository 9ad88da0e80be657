//! LSF adapter
//!
//! Shells out to `bsub`, `bjobs`, `bkill` and `bqueues`. Every command runs
//! under a timeout and is killed if it overruns.

use super::{ArrayStatusReport, ArrayTaskState, BatchScheduler, JobId, JobRequest};
use crate::collector::QueueProbe;
use crate::error::{Result, SchedError};
use crate::models::QueueReading;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LsfConfig {
    /// Per-sample alignment script; receives the chunk manifest as its argument
    pub align_script: PathBuf,
    /// Directory holding the LSF binaries; `None` resolves them through `PATH`
    pub bin_dir: Option<PathBuf>,
    pub command_timeout_secs: u64,
}

impl Default for LsfConfig {
    fn default() -> Self {
        Self {
            align_script: PathBuf::from("scripts/star_align.sh"),
            bin_dir: None,
            command_timeout_secs: 30,
        }
    }
}

pub struct LsfScheduler {
    config: LsfConfig,
}

impl LsfScheduler {
    pub fn new(config: LsfConfig) -> Self {
        Self { config }
    }

    fn program(&self, name: &str) -> PathBuf {
        match &self.config.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    async fn run(&self, name: &str, args: &[String]) -> Result<String> {
        let timeout = Duration::from_secs(self.config.command_timeout_secs);
        let mut command = Command::new(self.program(name));
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = name, args = ?args, "Running scheduler command");

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| {
                SchedError::Scheduler(format!("{} timed out after {}s", name, timeout.as_secs()))
            })?
            .map_err(|e| SchedError::Scheduler(format!("failed to run {}: {}", name, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SchedError::Scheduler(format!(
                "{} exited with {}: {}",
                name,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `bsub` arguments for an array job over a chunk manifest
    pub fn bsub_args(&self, request: &JobRequest) -> Vec<String> {
        let log = |ext: &str| {
            request
                .log_dir
                .join(format!("{}_%I.{}", request.job_name, ext))
                .to_string_lossy()
                .into_owned()
        };

        vec![
            "-J".to_string(),
            format!("{}[1-{}]", request.job_name, request.array_size),
            "-n".to_string(),
            request.threads.to_string(),
            "-M".to_string(),
            format!("{}GB", request.memory_gb),
            "-R".to_string(),
            "span[hosts=1]".to_string(),
            "-W".to_string(),
            format_walltime(request.walltime),
            "-q".to_string(),
            request.queue.clone(),
            "-o".to_string(),
            log("out"),
            "-e".to_string(),
            log("err"),
            self.config.align_script.to_string_lossy().into_owned(),
            request.manifest_path.to_string_lossy().into_owned(),
        ]
    }
}

/// LSF walltime as `HH:MM`
pub fn format_walltime(walltime: Duration) -> String {
    let minutes = walltime.as_secs().div_ceil(60);
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Extract the job id from `Job <12345> is submitted to queue <normal>.`
pub fn parse_bsub_output(output: &str) -> Option<JobId> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Job <")?;
        let (id, _) = rest.split_once('>')?;
        (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| JobId(id.to_string()))
    })
}

/// Parse `bjobs -noheader -o "jobindex stat"` rows into 0-based array states
pub fn parse_bjobs(job_id: &JobId, output: &str) -> ArrayStatusReport {
    let mut report = ArrayStatusReport::new(job_id.clone());

    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(index), Some(stat)) = (parts.next(), parts.next()) else {
            continue;
        };
        // LSF array indices start at 1
        let Some(offset) = index.parse::<usize>().ok().and_then(|i| i.checked_sub(1)) else {
            continue;
        };

        let state = match stat {
            "PEND" | "PSUSP" => ArrayTaskState::Queued,
            "RUN" | "USUSP" | "SSUSP" => ArrayTaskState::Running,
            "DONE" => ArrayTaskState::Done,
            "EXIT" => ArrayTaskState::Failed,
            _ => ArrayTaskState::Unknown,
        };
        report.tasks.insert(offset, state);
    }

    report
}

/// Parse `bqueues -w` output, locating columns by header name
pub fn parse_bqueues(output: &str) -> Result<Vec<QueueReading>> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| SchedError::Scheduler("bqueues returned no output".to_string()))?
        .split_whitespace()
        .collect();

    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| SchedError::Scheduler(format!("bqueues header lacks {}", name)))
    };
    let name_col = column("QUEUE_NAME")?;
    let max_col = column("MAX")?;
    let pend_col = column("PEND")?;
    let run_col = column("RUN")?;

    let count = |fields: &[&str], col: usize| -> u32 {
        fields.get(col).and_then(|v| v.parse().ok()).unwrap_or(0)
    };

    Ok(lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let name = fields.get(name_col)?;
            Some(QueueReading {
                name: name.to_string(),
                pending: count(&fields, pend_col),
                running: count(&fields, run_col),
                slot_limit: fields
                    .get(max_col)
                    .and_then(|v| v.parse::<u32>().ok())
                    .filter(|max| *max > 0),
            })
        })
        .collect())
}

#[async_trait]
impl BatchScheduler for LsfScheduler {
    async fn submit(&self, request: &JobRequest) -> Result<JobId> {
        let output = self.run("bsub", &self.bsub_args(request)).await?;
        let job_id = parse_bsub_output(&output).ok_or_else(|| {
            SchedError::Scheduler(format!("unrecognized bsub output: {}", output.trim()))
        })?;
        info!(
            job_id = %job_id,
            job_name = %request.job_name,
            array_size = request.array_size,
            queue = %request.queue,
            "Array job submitted"
        );
        Ok(job_id)
    }

    async fn query(&self, job: &JobId) -> Result<ArrayStatusReport> {
        let args = vec![
            "-noheader".to_string(),
            "-o".to_string(),
            "jobindex stat".to_string(),
            job.0.clone(),
        ];
        let output = self.run("bjobs", &args).await?;
        Ok(parse_bjobs(job, &output))
    }

    async fn kill(&self, job: &JobId) -> Result<()> {
        self.run("bkill", &[job.0.clone()]).await?;
        info!(job_id = %job, "Array job killed");
        Ok(())
    }
}

#[async_trait]
impl QueueProbe for LsfScheduler {
    async fn occupancy(&self) -> anyhow::Result<Vec<QueueReading>> {
        let output = self.run("bqueues", &["-w".to_string()]).await?;
        Ok(parse_bqueues(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BQUEUES: &str = "\
QUEUE_NAME      PRIO STATUS          MAX JL/U JL/P JL/H NJOBS  PEND   RUN  SUSP
hiprio           50  Open:Active      50    -    -    -    12     2    10     0
normal           30  Open:Active       -    -    -    -    85    40    45     0
long             20  Open:Inact       20    -    -    -     3     0     3     0
";

    #[test]
    fn test_parse_bsub_output() {
        let out = "Job <8675309> is submitted to queue <normal>.\n";
        assert_eq!(parse_bsub_output(out), Some(JobId("8675309".to_string())));
        assert_eq!(parse_bsub_output("Request aborted by esub."), None);
    }

    #[test]
    fn test_parse_bjobs_maps_states_to_offsets() {
        let out = "1 DONE\n2 EXIT\n3 RUN\n4 PEND\n5 ZOMBI\n\ngarbage\n";
        let report = parse_bjobs(&JobId("1".to_string()), out);

        assert_eq!(report.reported(), 5);
        assert_eq!(report.state_of(0), Some(ArrayTaskState::Done));
        assert_eq!(report.state_of(1), Some(ArrayTaskState::Failed));
        assert_eq!(report.state_of(2), Some(ArrayTaskState::Running));
        assert_eq!(report.state_of(3), Some(ArrayTaskState::Queued));
        assert_eq!(report.state_of(4), Some(ArrayTaskState::Unknown));
    }

    #[test]
    fn test_parse_bqueues_by_header() {
        let queues = parse_bqueues(BQUEUES).unwrap();
        assert_eq!(queues.len(), 3);

        let normal = queues.iter().find(|q| q.name == "normal").unwrap();
        assert_eq!(normal.pending, 40);
        assert_eq!(normal.running, 45);
        assert_eq!(normal.slot_limit, None);

        let hiprio = queues.iter().find(|q| q.name == "hiprio").unwrap();
        assert_eq!(hiprio.slot_limit, Some(50));
    }

    #[test]
    fn test_parse_bqueues_rejects_unknown_layout() {
        assert!(parse_bqueues("").is_err());
        assert!(parse_bqueues("NAME STATE\nnormal open\n").is_err());
    }

    #[test]
    fn test_format_walltime() {
        assert_eq!(format_walltime(Duration::from_secs(72 * 3600)), "72:00");
        assert_eq!(format_walltime(Duration::from_secs(5400)), "01:30");
        assert_eq!(format_walltime(Duration::from_secs(61)), "00:02");
    }

    #[test]
    fn test_bsub_args() {
        let scheduler = LsfScheduler::new(LsfConfig {
            align_script: PathBuf::from("/opt/align/star_align.sh"),
            ..LsfConfig::default()
        });
        let request = JobRequest {
            job_name: "chunk_003".to_string(),
            array_size: 250,
            threads: 8,
            memory_gb: 128,
            walltime: Duration::from_secs(72 * 3600),
            queue: "normal".to_string(),
            manifest_path: PathBuf::from("/work/chunks/chunk_003_manifest.csv"),
            log_dir: PathBuf::from("/work/logs"),
        };

        let args = scheduler.bsub_args(&request);
        assert_eq!(&args[0..2], &["-J", "chunk_003[1-250]"]);
        assert!(args.windows(2).any(|w| w == ["-M", "128GB"]));
        assert!(args.windows(2).any(|w| w == ["-W", "72:00"]));
        assert!(args.windows(2).any(|w| w == ["-o", "/work/logs/chunk_003_%I.out"]));
        assert_eq!(
            &args[args.len() - 2..],
            &["/opt/align/star_align.sh", "/work/chunks/chunk_003_manifest.csv"]
        );
    }

    #[cfg(unix)]
    mod fake_binaries {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn install(dir: &TempDir, name: &str, body: &str) {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn scheduler(dir: &TempDir, timeout_secs: u64) -> LsfScheduler {
            LsfScheduler::new(LsfConfig {
                bin_dir: Some(dir.path().to_path_buf()),
                command_timeout_secs: timeout_secs,
                ..LsfConfig::default()
            })
        }

        fn request() -> JobRequest {
            JobRequest {
                job_name: "chunk_001".to_string(),
                array_size: 2,
                threads: 8,
                memory_gb: 64,
                walltime: Duration::from_secs(3600),
                queue: "normal".to_string(),
                manifest_path: PathBuf::from("chunk_001_manifest.csv"),
                log_dir: PathBuf::from("logs"),
            }
        }

        #[tokio::test]
        async fn test_submit_and_query_through_commands() {
            let dir = TempDir::new().unwrap();
            install(&dir, "bsub", "echo 'Job <4242> is submitted to queue <normal>.'");
            install(&dir, "bjobs", "printf '1 DONE\\n2 RUN\\n'");
            let lsf = scheduler(&dir, 5);

            let job = lsf.submit(&request()).await.unwrap();
            assert_eq!(job, JobId("4242".to_string()));

            let report = lsf.query(&job).await.unwrap();
            assert_eq!(report.state_of(0), Some(ArrayTaskState::Done));
            assert_eq!(report.state_of(1), Some(ArrayTaskState::Running));
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_scheduler_error() {
            let dir = TempDir::new().unwrap();
            install(&dir, "bsub", "echo 'queue closed' >&2; exit 255");
            let lsf = scheduler(&dir, 5);

            let err = lsf.submit(&request()).await.unwrap_err();
            assert!(err.is_retryable());
            assert!(err.to_string().contains("queue closed"));
        }

        #[tokio::test]
        async fn test_hung_command_times_out() {
            let dir = TempDir::new().unwrap();
            install(&dir, "bqueues", "sleep 30");
            let lsf = scheduler(&dir, 1);

            let started = std::time::Instant::now();
            assert!(lsf.occupancy().await.is_err());
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }
}
