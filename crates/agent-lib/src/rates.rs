//! Percentage and rate derivation from two counter readings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a per-second rate computation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RateOutcome {
    /// The counter reads zero, which means it could not be read (permissions)
    Unavailable,
    /// No usable time window or prior reading, or the counter went backwards
    #[default]
    Unmeasured,
    /// Measured rate per second
    Value(f32),
}

impl RateOutcome {
    /// Legacy numeric encoding: -1 for unavailable counters, nothing when unmeasured
    pub fn wire_value(&self) -> Option<f32> {
        match self {
            RateOutcome::Unavailable => Some(-1.0),
            RateOutcome::Unmeasured => None,
            RateOutcome::Value(v) => Some(*v),
        }
    }

    pub fn value(&self) -> Option<f32> {
        match self {
            RateOutcome::Value(v) => Some(*v),
            _ => None,
        }
    }
}

/// CPU usage percentage normalized to the number of logical cores.
///
/// Returns 0 when `delta` is zero (both samples in the same tick). The result
/// can exceed 100 on multi-core hosts.
pub fn calculate_pct(prev: f64, curr: f64, delta: f64, num_cpus: f64) -> f32 {
    if delta == 0.0 {
        return 0.0;
    }
    let delta_proc = curr - prev;
    (((delta_proc / delta) * 100.0) * num_cpus) as f32
}

/// Per-second rate of a cumulative counter over `elapsed_secs`
pub fn calculate_rate(prev: u64, curr: u64, elapsed_secs: f64) -> RateOutcome {
    if elapsed_secs <= 0.0 {
        return RateOutcome::Unmeasured;
    }
    // Counter reset, including a drop to zero: the prior reading is unusable
    if curr < prev {
        return RateOutcome::Unmeasured;
    }
    // A zero reading means the counter file could not be opened
    if curr == 0 {
        return RateOutcome::Unavailable;
    }
    RateOutcome::Value(((curr - prev) as f64 / elapsed_secs) as f32)
}

/// Whole seconds elapsed since `previous`, or `None` when there is no
/// previous timestamp or no time has passed
pub fn elapsed_since(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<f64> {
    let previous = previous?;
    let diff = now.timestamp() - previous.timestamp();
    if diff <= 0 {
        return None;
    }
    Some(diff as f64)
}
