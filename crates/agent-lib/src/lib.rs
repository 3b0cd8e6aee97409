//! Agent library for process monitoring
//!
//! This crate provides the core functionality for:
//! - Process snapshots from `/proc` and container discovery from cgroups
//! - Command line scrubbing and blacklisting
//! - Differencing checks that turn samples into bounded message groups
//! - Health checks and observability

pub mod checks;
pub mod collector;
pub mod config;
pub mod health;
pub mod models;
pub mod observability;
pub mod rates;
pub mod scrubber;

pub use checks::{Check, CheckError, MessageBody, ProcessCheck, RealTimeCheck};
pub use config::{CheckConfig, ConfigError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use scrubber::DataScrubber;
