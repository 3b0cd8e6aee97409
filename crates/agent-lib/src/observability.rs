//! Observability infrastructure for the process agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, processes reported, messages emitted, cycle errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, GaugeVec, HistogramVec,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle latency (in seconds). A process cycle
/// includes the CPU sampling window, so the range reaches well past 1s.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 1.5, 2.0, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    cycle_latency_seconds: HistogramVec,
    processes_reported: IntCounterVec,
    messages_emitted: IntCounterVec,
    cycle_errors: IntCounterVec,
    last_success_timestamp: GaugeVec,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram_vec!(
                "process_agent_cycle_latency_seconds",
                "Time spent running one check cycle",
                &["check"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            processes_reported: register_int_counter_vec!(
                "process_agent_processes_reported_total",
                "Total number of process records emitted",
                &["check"]
            )
            .expect("Failed to register processes_reported_total"),

            messages_emitted: register_int_counter_vec!(
                "process_agent_messages_emitted_total",
                "Total number of messages emitted",
                &["check"]
            )
            .expect("Failed to register messages_emitted_total"),

            cycle_errors: register_int_counter_vec!(
                "process_agent_cycle_errors_total",
                "Total number of failed check cycles",
                &["check"]
            )
            .expect("Failed to register cycle_errors_total"),

            last_success_timestamp: register_gauge_vec!(
                "process_agent_last_success_timestamp_seconds",
                "Unix time of the last successful cycle",
                &["check"]
            )
            .expect("Failed to register last_success_timestamp_seconds"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    /// Record how long a cycle took
    pub fn observe_cycle_latency(&self, check: &str, duration_secs: f64) {
        self.inner()
            .cycle_latency_seconds
            .with_label_values(&[check])
            .observe(duration_secs);
    }

    /// Record the output of a successful cycle
    pub fn record_cycle_output(&self, check: &str, messages: usize, processes: usize) {
        let inner = self.inner();
        inner
            .messages_emitted
            .with_label_values(&[check])
            .inc_by(messages as u64);
        inner
            .processes_reported
            .with_label_values(&[check])
            .inc_by(processes as u64);
        inner
            .last_success_timestamp
            .with_label_values(&[check])
            .set(chrono::Utc::now().timestamp() as f64);
    }

    /// Increment the failed cycle counter
    pub fn inc_cycle_errors(&self, check: &str) {
        self.inner().cycle_errors.with_label_values(&[check]).inc();
    }

    /// Current value of the failed cycle counter
    pub fn cycle_errors(&self, check: &str) -> u64 {
        self.inner().cycle_errors.with_label_values(&[check]).get()
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for cycles and lifecycle
/// events.
#[derive(Clone)]
pub struct StructuredLogger {
    host_name: String,
}

impl StructuredLogger {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, checks: &[&str]) {
        info!(
            event = "agent_started",
            host = %self.host_name,
            agent_version = %version,
            checks = ?checks,
            "Process agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            host = %self.host_name,
            reason = %reason,
            "Process agent shutting down"
        );
    }

    /// Log a completed cycle
    pub fn log_cycle(
        &self,
        check: &str,
        group_id: i32,
        messages: usize,
        processes: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "check_cycle",
            host = %self.host_name,
            check = %check,
            group_id = group_id,
            messages = messages,
            processes = processes,
            elapsed_ms = elapsed_ms as u64,
            "Check cycle complete"
        );
    }

    /// Log a skipped cycle; one entry per failed cycle
    pub fn log_cycle_failed(&self, check: &str, group_id: i32, error: &str) {
        warn!(
            event = "check_cycle_failed",
            host = %self.host_name,
            check = %check,
            group_id = group_id,
            error = %error,
            "Check cycle failed, no messages sent"
        );
    }
}
