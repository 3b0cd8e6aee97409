//! Check scheduling loop
//!
//! Runs one check on a fixed interval and forwards each cycle's messages to
//! a channel. Cycles of the same check never overlap: the check is moved
//! into a blocking task for the cycle and handed back when it finishes.

use super::{Check, MessageBody};
use crate::health::HealthRegistry;
use crate::observability::{AgentMetrics, StructuredLogger};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for a check loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Time between cycle starts (default: 10 seconds)
    pub interval: Duration,
    /// Channel buffer size, in cycles
    pub buffer_size: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            buffer_size: 16,
        }
    }
}

/// Periodically runs a check and sends its messages downstream
pub struct CheckLoop {
    /// Taken out while a cycle runs on the blocking pool
    check: Option<Box<dyn Check>>,
    name: &'static str,
    config: LoopConfig,
    messages_tx: mpsc::Sender<Vec<MessageBody>>,
    group_id: i32,
    metrics: Option<AgentMetrics>,
    health: Option<HealthRegistry>,
    health_component: Option<&'static str>,
    logger: Option<StructuredLogger>,
}

impl CheckLoop {
    pub fn new(
        check: Box<dyn Check>,
        config: LoopConfig,
    ) -> (Self, mpsc::Receiver<Vec<MessageBody>>) {
        let (messages_tx, messages_rx) = mpsc::channel(config.buffer_size.max(1));

        let loop_instance = Self {
            name: check.name(),
            check: Some(check),
            config,
            messages_tx,
            group_id: 0,
            metrics: None,
            health: None,
            health_component: None,
            logger: None,
        };

        (loop_instance, messages_rx)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            check = self.name,
            interval_secs = self.config.interval.as_secs(),
            "Starting check loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(check = self.name, error = %e, "Check loop cannot continue");
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    info!(check = self.name, "Shutting down check loop");
                    break;
                }
            }
        }
    }

    fn next_group_id(&mut self) -> i32 {
        self.group_id = self.group_id.wrapping_add(1);
        self.group_id
    }

    /// Run one cycle. A failed cycle is reported and skipped; only losing
    /// the check itself (a panic inside the cycle) is an error.
    pub async fn run_cycle(&mut self) -> Result<()> {
        let mut check = self
            .check
            .take()
            .context("Check was lost in a previous cycle")?;
        let group_id = self.next_group_id();
        let start = Instant::now();

        let (check, result) = tokio::task::spawn_blocking(move || {
            let result = check.run(group_id);
            (check, result)
        })
        .await
        .context("Check cycle panicked")?;
        let collaborators = check.collaborator_health();
        self.check = Some(check);

        if let Some(health) = &self.health {
            for (component, error) in collaborators {
                health.report(component, error).await;
            }
        }

        let elapsed = start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle_latency(self.name, elapsed.as_secs_f64());
        }

        match result {
            Ok(messages) => {
                let processes: usize = messages.iter().map(MessageBody::len).sum();
                let count = messages.len();

                if let Some(metrics) = &self.metrics {
                    metrics.record_cycle_output(self.name, count, processes);
                }
                if let Some(logger) = &self.logger {
                    logger.log_cycle(self.name, group_id, count, processes, elapsed.as_millis());
                }
                if let (Some(health), Some(component)) = (&self.health, self.health_component) {
                    health.set_healthy(component).await;
                }

                if messages.is_empty() {
                    debug!(check = self.name, "Cycle produced no messages");
                } else if let Err(e) = self.messages_tx.send(messages).await {
                    warn!(check = self.name, error = %e, "Failed to send messages to channel");
                }
            }
            Err(e) => {
                let error = e.to_string();
                if let Some(metrics) = &self.metrics {
                    metrics.inc_cycle_errors(self.name);
                }
                match &self.logger {
                    Some(logger) => logger.log_cycle_failed(self.name, group_id, &error),
                    None => warn!(check = self.name, group_id, error = %error, "Check cycle failed"),
                }
                if let (Some(health), Some(component)) = (&self.health, self.health_component) {
                    health.set_degraded(component, error).await;
                }
            }
        }

        Ok(())
    }
}

/// Builder for creating a check loop
pub struct CheckLoopBuilder {
    check: Option<Box<dyn Check>>,
    config: LoopConfig,
    metrics: Option<AgentMetrics>,
    health: Option<(HealthRegistry, &'static str)>,
    logger: Option<StructuredLogger>,
}

impl CheckLoopBuilder {
    pub fn new() -> Self {
        Self {
            check: None,
            config: LoopConfig::default(),
            metrics: None,
            health: None,
            logger: None,
        }
    }

    /// Set the check to run
    pub fn check(mut self, check: Box<dyn Check>) -> Self {
        self.check = Some(check);
        self
    }

    /// Set the interval between cycles
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the channel buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Record cycle metrics
    pub fn metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Report cycle outcomes as the health of `component`
    pub fn health(mut self, registry: HealthRegistry, component: &'static str) -> Self {
        self.health = Some((registry, component));
        self
    }

    /// Emit structured cycle logs
    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<(CheckLoop, mpsc::Receiver<Vec<MessageBody>>)> {
        let check = self
            .check
            .ok_or_else(|| anyhow::anyhow!("Check is required"))?;

        let (mut check_loop, rx) = CheckLoop::new(check, self.config);
        check_loop.metrics = self.metrics;
        check_loop.logger = self.logger;
        if let Some((registry, component)) = self.health {
            check_loop.health = Some(registry);
            check_loop.health_component = Some(component);
        }

        Ok((check_loop, rx))
    }
}

impl Default for CheckLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{CheckError, CollectorRealTime};
    use crate::collector::CollectError;
    use crate::health::{components, ComponentStatus};

    /// Check that fails every other cycle and records the group ids it saw
    struct FlakyCheck {
        seen: Vec<i32>,
    }

    impl Check for FlakyCheck {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn run(&mut self, group_id: i32) -> Result<Vec<MessageBody>, CheckError> {
            self.seen.push(group_id);
            if group_id % 2 == 0 {
                return Err(CheckError::Collection(CollectError::Failed(
                    "proc unreadable".to_string(),
                )));
            }
            Ok(vec![MessageBody::RealTime(CollectorRealTime {
                host_name: "test-host".to_string(),
                group_id,
                group_size: 1,
                num_cpus: 1,
                total_memory: 0,
                stats: Vec::new(),
            })])
        }
    }

    /// Check whose container source fails on every other cycle
    struct ContainerFlakyCheck {
        listing: Option<String>,
    }

    impl Check for ContainerFlakyCheck {
        fn name(&self) -> &'static str {
            "containers"
        }

        fn run(&mut self, group_id: i32) -> Result<Vec<MessageBody>, CheckError> {
            self.listing = (group_id % 2 == 1).then(|| "runtime unreachable".to_string());
            Ok(Vec::new())
        }

        fn collaborator_health(&self) -> Vec<(&'static str, Option<String>)> {
            vec![(components::CONTAINER_SOURCE, self.listing.clone())]
        }
    }

    #[test]
    fn test_loop_config_default() {
        let config = LoopConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.buffer_size, 16);
    }

    #[test]
    fn test_builder_missing_check() {
        let result = CheckLoopBuilder::new().interval(Duration::from_secs(2)).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_cycle_forwards_messages_and_increments_group() {
        let (mut check_loop, mut rx) = CheckLoopBuilder::new()
            .check(Box::new(FlakyCheck { seen: Vec::new() }))
            .build()
            .unwrap();
        assert_eq!(check_loop.name(), "flaky");

        check_loop.run_cycle().await.unwrap();
        let messages = rx.try_recv().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].group_id(), 1);

        // Failed cycle: nothing sent, loop keeps going
        check_loop.run_cycle().await.unwrap();
        assert!(rx.try_recv().is_err());

        check_loop.run_cycle().await.unwrap();
        assert_eq!(rx.try_recv().unwrap()[0].group_id(), 3);
    }

    #[tokio::test]
    async fn test_failed_cycle_reports_degraded_health() {
        let registry = HealthRegistry::new();
        registry.register(components::PROCESS_CHECK).await;
        let metrics = AgentMetrics::new();
        let errors_before = metrics.cycle_errors("flaky");

        let (mut check_loop, _rx) = CheckLoopBuilder::new()
            .check(Box::new(FlakyCheck { seen: Vec::new() }))
            .health(registry.clone(), components::PROCESS_CHECK)
            .metrics(metrics.clone())
            .logger(StructuredLogger::new("test-host"))
            .build()
            .unwrap();

        check_loop.run_cycle().await.unwrap();
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        check_loop.run_cycle().await.unwrap();
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert!(metrics.cycle_errors("flaky") > errors_before);

        check_loop.run_cycle().await.unwrap();
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_cycle_reports_collaborator_health() {
        let registry = HealthRegistry::new();
        registry.register(components::PROCESS_CHECK).await;
        registry.register(components::CONTAINER_SOURCE).await;

        let (mut check_loop, _rx) = CheckLoopBuilder::new()
            .check(Box::new(ContainerFlakyCheck { listing: None }))
            .health(registry.clone(), components::PROCESS_CHECK)
            .build()
            .unwrap();

        check_loop.run_cycle().await.unwrap();
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::CONTAINER_SOURCE].message.as_deref(),
            Some("runtime unreachable")
        );

        // Runtime came back
        check_loop.run_cycle().await.unwrap();
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let (check_loop, _rx) = CheckLoopBuilder::new()
            .check(Box::new(FlakyCheck { seen: Vec::new() }))
            .interval(Duration::from_millis(10))
            .build()
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(check_loop.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
