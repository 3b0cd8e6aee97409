//! Process check
//!
//! Differencing check: the first run only records a baseline, every later
//! run reports the processes seen in both the previous and the current
//! sample, with CPU and I/O rates derived from the two.

use super::chunk::{process_messages, MessageBody};
use super::containers::ContainerIndex;
use super::format::{format_processes, CycleInputs};
use super::history::{container_churn, SampleHistory};
use super::{Check, CheckError, PROCESS_CHECK};
use crate::collector::{ContainerSource, SnapshotProvider};
use crate::config::CheckConfig;
use crate::health::components;
use crate::models::Container;
use crate::rates::elapsed_since;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct ProcessCheck {
    config: Arc<CheckConfig>,
    provider: Arc<dyn SnapshotProvider>,
    container_source: Arc<dyn ContainerSource>,
    /// `None` until the first run
    history: Option<SampleHistory>,
    /// Outcome of the last container listing, `None` before the first
    container_listing: Option<Result<(), String>>,
}

impl ProcessCheck {
    pub fn new(
        config: Arc<CheckConfig>,
        provider: Arc<dyn SnapshotProvider>,
        container_source: Arc<dyn ContainerSource>,
    ) -> Self {
        Self {
            config,
            provider,
            container_source,
            history: None,
            container_listing: None,
        }
    }

    /// True once a baseline sample has been recorded
    pub fn is_warmed(&self) -> bool {
        self.history.is_some()
    }

    pub fn history(&self) -> Option<&SampleHistory> {
        self.history.as_ref()
    }

    pub(crate) fn run_at(
        &mut self,
        group_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageBody>, CheckError> {
        let start = Instant::now();

        let cpu_times = self
            .provider
            .cpu_times()
            .map_err(CheckError::Collection)?;
        let processes = self
            .provider
            .sample(self.config.cpu_sample_window, self.config.concurrency)
            .map_err(CheckError::Collection)?;
        let containers = self.list_containers();

        let Some(history) = self.history.as_ref() else {
            info!(
                processes = processes.len(),
                "First process check run, recording baseline"
            );
            self.history = Some(SampleHistory::new(processes, containers, cpu_times, now));
            return Ok(Vec::new());
        };

        let info = self
            .provider
            .system_info()
            .map_err(CheckError::SystemInfo)?;

        let index = ContainerIndex::correlate(containers);
        let records = format_processes(
            &self.config,
            &CycleInputs {
                current: &processes,
                cpu_times: &cpu_times,
                containers: &index,
                history,
                num_cpus: info.num_cpus(),
                elapsed_secs: elapsed_since(Some(history.taken_at()), now),
            },
        );

        let (started, stopped) = container_churn(history.containers(), index.containers());
        if started > 0 || stopped > 0 {
            debug!(started, stopped, "Containers changed since last run");
        }

        let reported = records.len();
        let messages = process_messages(
            records,
            self.config.max_per_message,
            &self.config.host_name,
            group_id,
            &info,
        );

        self.history = Some(SampleHistory::new(
            processes,
            index.into_containers(),
            cpu_times,
            now,
        ));

        debug!(
            processes = reported,
            messages = messages.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Collected processes"
        );

        Ok(messages)
    }

    /// Container listing never fails the cycle
    fn list_containers(&mut self) -> Vec<Container> {
        match self.container_source.list() {
            Ok(containers) => {
                self.container_listing = Some(Ok(()));
                containers
            }
            Err(e) => {
                if e.is_unavailable() {
                    warn!(
                        event = "containers_unavailable",
                        reason = %e,
                        "Container runtime not available, skipping correlation"
                    );
                } else {
                    warn!(error = %e, "Unable to list containers");
                }
                self.container_listing = Some(Err(e.to_string()));
                Vec::new()
            }
        }
    }
}

impl Check for ProcessCheck {
    fn name(&self) -> &'static str {
        PROCESS_CHECK
    }

    fn run(&mut self, group_id: i32) -> Result<Vec<MessageBody>, CheckError> {
        self.run_at(group_id, Utc::now())
    }

    fn collaborator_health(&self) -> Vec<(&'static str, Option<String>)> {
        match &self.container_listing {
            Some(outcome) => vec![(components::CONTAINER_SOURCE, outcome.clone().err())],
            None => Vec::new(),
        }
    }
}
