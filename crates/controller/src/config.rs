//! Controller configuration

use anyhow::{Context, Result};
use sched_lib::config::ResourceConfig;
use sched_lib::controller::ControlLoopConfig;
use sched_lib::scheduler::LsfConfig;
use sched_lib::submit::SubmitSettings;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "ALIGN_CONFIG";

/// Controller configuration
///
/// Every field has a default; nested keys are set from the environment
/// with `__`, e.g. `ALIGN_RESOURCES__CHUNK__BASELINE_CHUNK_SIZE=800`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Tag attached to every structured event
    pub cluster_name: String,

    /// Port for health, metrics and operator endpoints
    pub api_port: u16,

    /// Directory searched for FASTQ pairs when no manifest exists yet
    pub input_dir: Option<PathBuf>,

    pub manifest_path: PathBuf,
    pub state_path: PathBuf,
    pub history_path: PathBuf,
    pub chunk_dir: PathBuf,
    pub log_dir: PathBuf,

    /// Any path on the output volume
    pub storage_path: PathBuf,

    /// Seconds between control cycles
    pub interval_secs: u64,

    /// Plan without submitting when false
    pub auto_submit: bool,

    pub max_submissions_per_cycle: usize,

    /// Bound for each scheduler call during submission and polling
    pub scheduler_call_timeout_secs: u64,

    pub resources: ResourceConfig,
    pub lsf: LsfConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_name: std::env::var("LSF_CLUSTER_NAME").unwrap_or_else(|_| "unknown".to_string()),
            api_port: 8080,
            input_dir: None,
            manifest_path: PathBuf::from("sample_manifest.csv"),
            state_path: PathBuf::from("state/tracker.json"),
            history_path: PathBuf::from("state/resource_history.json"),
            chunk_dir: PathBuf::from("chunks"),
            log_dir: PathBuf::from("logs"),
            storage_path: PathBuf::from("."),
            interval_secs: 300,
            auto_submit: true,
            max_submissions_per_cycle: 10,
            scheduler_call_timeout_secs: 60,
            resources: ResourceConfig::default(),
            lsf: LsfConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the optional file and the environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }

        let config: ControllerConfig = builder
            .add_source(
                config::Environment::with_prefix("ALIGN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.resources.validate()?;
        if self.interval_secs == 0 {
            anyhow::bail!("interval_secs must be positive");
        }
        if self.max_submissions_per_cycle == 0 && self.auto_submit {
            anyhow::bail!("max_submissions_per_cycle must be positive when auto_submit is on");
        }
        Ok(())
    }

    pub fn control_loop(&self) -> ControlLoopConfig {
        ControlLoopConfig {
            interval: Duration::from_secs(self.interval_secs),
            auto_submit: self.auto_submit,
            max_submissions_per_cycle: self.max_submissions_per_cycle,
            history_path: Some(self.history_path.clone()),
            manifest_path: Some(self.manifest_path.clone()),
        }
    }

    pub fn submit_settings(&self) -> SubmitSettings {
        SubmitSettings {
            chunk_dir: self.chunk_dir.clone(),
            log_dir: self.log_dir.clone(),
            retry: self.resources.retry.clone(),
            call_timeout: Duration::from_secs(self.scheduler_call_timeout_secs),
        }
    }
}
