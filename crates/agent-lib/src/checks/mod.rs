//! Process and real-time checks
//!
//! A check turns one round of sampling into a group of bounded messages.
//! The process check keeps the previous sample so it can derive rates; the
//! real-time check is stateless and only reports numeric stats.

mod chunk;
mod containers;
mod format;
mod history;
mod process;
mod real_time;
mod runner;


pub use chunk::{chunk, process_messages, real_time_messages, CollectorProc, CollectorRealTime, MessageBody};
pub use containers::ContainerIndex;
pub use format::{
    format_processes, format_real_time, CommandStat, ContainerStat, CpuStat, CycleInputs, IoStat,
    MemoryStat, ProcessRecord, ProcessStat, UserStat,
};
pub use history::{container_churn, SampleHistory};
pub use process::ProcessCheck;
pub use real_time::RealTimeCheck;
pub use runner::{CheckLoop, CheckLoopBuilder, LoopConfig};

use crate::collector::CollectError;
use thiserror::Error;

/// Name of the process check
pub const PROCESS_CHECK: &str = "process";

/// Name of the real-time check
pub const REALTIME_CHECK: &str = "realtime";

/// Reasons a cycle produced no messages
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to collect processes: {0}")]
    Collection(#[source] CollectError),

    #[error("failed to collect system info: {0}")]
    SystemInfo(#[source] CollectError),
}

/// A periodically run check
pub trait Check: Send {
    /// Short name used in logs, metrics and health reporting
    fn name(&self) -> &'static str;

    /// Run one cycle. Callers must not run two cycles of the same check at
    /// the same time; `&mut self` enforces that.
    fn run(&mut self, group_id: i32) -> Result<Vec<MessageBody>, CheckError>;

    /// Health of collaborators seen during the last cycle, as
    /// `(component, error)` pairs
    fn collaborator_health(&self) -> Vec<(&'static str, Option<String>)> {
        Vec::new()
    }
}
