//! Resource-aware scheduling core for batch genomic alignment
//!
//! This crate provides the core functionality for:
//! - Telemetry collection from the submission host and batch scheduler
//! - Predictive risk assessment with storage trend projection
//! - Admission-controlled chunk sizing and queue-aware submission planning
//! - Durable per-sample status tracking
//! - LSF submission, polling and cancellation
//! - Health checks and observability

pub mod collector;
pub mod config;
pub mod controller;
pub mod error;
pub mod health;
pub mod manifest;
pub mod models;
pub mod observability;
pub mod persist;
pub mod planner;
pub mod risk;
pub mod scheduler;
pub mod submit;
pub mod tracker;

pub use config::ResourceConfig;
pub use controller::{ControlLoop, ControlLoopConfig, CycleReport, SharedReport};
pub use error::{AdmissionRefusal, Result, SchedError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SchedulerMetrics, StructuredLogger};
pub use submit::{SharedTracker, StatusPoller, Submitter};
pub use tracker::StateTracker;
