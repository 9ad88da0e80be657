//! Alignment controller - resource-aware batch submission
//!
//! This binary runs on the cluster submission host, watching output
//! storage and queue pressure and feeding alignment chunks to LSF.

use align_controller::{api, config::ControllerConfig};
use anyhow::{Context, Result};
use sched_lib::{
    collector::HostTelemetry,
    controller::ControlLoop,
    health::HealthRegistry,
    manifest,
    observability::StructuredLogger,
    scheduler::LsfScheduler,
    Sample, StateTracker, Submitter,
};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting align-controller");

    let config = ControllerConfig::load()?;
    info!(
        cluster = %config.cluster_name,
        auto_submit = config.auto_submit,
        "Controller configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let logger = StructuredLogger::new(&config.cluster_name);

    let samples = load_samples(&config)?;
    let tracker = StateTracker::open(&config.state_path, samples)?;
    logger.log_startup(CONTROLLER_VERSION, tracker.samples().len());
    let tracker = Arc::new(RwLock::new(tracker));

    let scheduler = Arc::new(LsfScheduler::new(config.lsf.clone()));
    let telemetry =
        Arc::new(HostTelemetry::new(&config.storage_path).with_queue_probe(scheduler.clone()));

    let control = ControlLoop::new(
        &config.resources,
        telemetry,
        scheduler.clone(),
        tracker.clone(),
        config.submit_settings(),
        config.control_loop(),
        logger.clone(),
    )
    .with_health(health_registry.clone());

    let submitter = Arc::new(Submitter::new(
        scheduler,
        config.submit_settings(),
        logger.clone(),
    ));
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        tracker,
        control.report_handle(),
        submitter,
    ));

    let (shutdown_tx, _) = broadcast::channel(1);
    let loop_handle = tokio::spawn(control.run(shutdown_tx.subscribe()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    // The loop finishes its current cycle before exiting
    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Control loop task failed");
    }
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}

/// Read the manifest, or build it from the input directory on first start
fn load_samples(config: &ControllerConfig) -> Result<Vec<Sample>> {
    if config.manifest_path.exists() {
        let samples = manifest::read(&config.manifest_path)?;
        info!(
            path = %config.manifest_path.display(),
            samples = samples.len(),
            "Loaded sample manifest"
        );
        return Ok(samples);
    }

    let input_dir = config.input_dir.as_ref().with_context(|| {
        format!(
            "No manifest at {} and no input_dir to discover samples from",
            config.manifest_path.display()
        )
    })?;
    let samples = manifest::discover(input_dir, config.resources.min_input_bytes)?;
    manifest::write(&config.manifest_path, &samples)?;
    Ok(samples)
}
