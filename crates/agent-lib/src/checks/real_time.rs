//! Real-time check
//!
//! Stateless: CPU usage comes from the two readings inside one snapshot and
//! the messages carry numbers only, never command lines.

use super::chunk::{real_time_messages, MessageBody};
use super::format::format_real_time;
use super::{Check, CheckError, REALTIME_CHECK};
use crate::collector::SnapshotProvider;
use crate::config::CheckConfig;
use std::sync::Arc;

pub struct RealTimeCheck {
    config: Arc<CheckConfig>,
    provider: Arc<dyn SnapshotProvider>,
}

impl RealTimeCheck {
    pub fn new(config: Arc<CheckConfig>, provider: Arc<dyn SnapshotProvider>) -> Self {
        Self { config, provider }
    }
}

impl Check for RealTimeCheck {
    fn name(&self) -> &'static str {
        REALTIME_CHECK
    }

    fn run(&mut self, group_id: i32) -> Result<Vec<MessageBody>, CheckError> {
        let processes = self
            .provider
            .sample(self.config.cpu_sample_window, self.config.concurrency)
            .map_err(CheckError::Collection)?;
        let info = self
            .provider
            .system_info()
            .map_err(CheckError::SystemInfo)?;

        let stats = format_real_time(&processes, info.num_cpus());

        Ok(real_time_messages(
            stats,
            self.config.max_per_message,
            &self.config.host_name,
            group_id,
            &info,
        ))
    }
}
