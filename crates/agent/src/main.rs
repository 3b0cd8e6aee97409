//! Process Agent - host process monitoring agent
//!
//! Samples every process on the host, correlates them with containers and
//! emits scrubbed, size-bounded message groups for the process and
//! real-time checks.

use anyhow::{bail, Context, Result};
use clap::Parser;
use process_agent_lib::{
    checks::{CheckLoopBuilder, MessageBody, PROCESS_CHECK, REALTIME_CHECK},
    collector::{CgroupContainerSource, ContainerSource, ProcfsProvider, SnapshotProvider},
    config::CheckConfig,
    health::{components, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
    Check, ProcessCheck, RealTimeCheck,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "process-agent", version, about = "Host process monitoring agent")]
struct Args {
    /// Path to a configuration file (toml, yaml or json)
    #[arg(short, long, env = "AGENT_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Run one check, print its messages as JSON and exit
    #[arg(long, value_name = "process|realtime")]
    check: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let config = config::AgentConfig::load(args.config.as_deref())?;
    let check_config = Arc::new(config.check_config()?);
    info!(
        host_name = %config.host_name,
        proc_root = %config.proc_root.display(),
        "Agent configured"
    );

    let provider: Arc<dyn SnapshotProvider> =
        Arc::new(ProcfsProvider::new(&config.proc_root).with_passwd(&config.passwd_path));
    let container_source: Arc<dyn ContainerSource> =
        Arc::new(CgroupContainerSource::new(&config.cgroup_root));

    if let Some(name) = args.check.as_deref() {
        return run_check_once(name, check_config, provider, container_source).await;
    }

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::PROCESS_CHECK).await;
    health_registry.register(components::CONTAINER_SOURCE).await;
    if config.realtime_enabled {
        health_registry.register(components::REALTIME_CHECK).await;
    }

    match container_source.list() {
        Ok(containers) => info!(containers = containers.len(), "Container source ready"),
        Err(e) => {
            warn!(error = %e, "Container correlation unavailable");
            health_registry
                .set_degraded(components::CONTAINER_SOURCE, e.to_string())
                .await;
        }
    }

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.host_name);

    let mut enabled = vec![PROCESS_CHECK];
    if config.realtime_enabled {
        enabled.push(REALTIME_CHECK);
    }
    logger.log_startup(AGENT_VERSION, &enabled);

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (out_tx, out_rx) = mpsc::channel::<Vec<MessageBody>>(32);
    let mut loop_handles = Vec::new();

    let process_check = ProcessCheck::new(
        check_config.clone(),
        provider.clone(),
        container_source.clone(),
    );
    let (process_loop, process_rx) = CheckLoopBuilder::new()
        .check(Box::new(process_check))
        .interval(config.process_interval())
        .metrics(metrics.clone())
        .health(health_registry.clone(), components::PROCESS_CHECK)
        .logger(logger.clone())
        .build()?;
    loop_handles.push(tokio::spawn(process_loop.run(shutdown_tx.subscribe())));
    loop_handles.push(tokio::spawn(forward(process_rx, out_tx.clone())));

    if config.realtime_enabled {
        let realtime_check = RealTimeCheck::new(check_config.clone(), provider.clone());
        let (realtime_loop, realtime_rx) = CheckLoopBuilder::new()
            .check(Box::new(realtime_check))
            .interval(config.realtime_interval())
            .metrics(metrics.clone())
            .health(health_registry.clone(), components::REALTIME_CHECK)
            .logger(logger.clone())
            .build()?;
        loop_handles.push(tokio::spawn(realtime_loop.run(shutdown_tx.subscribe())));
        loop_handles.push(tokio::spawn(forward(realtime_rx, out_tx.clone())));
    }
    drop(out_tx);

    let output_handle = tokio::spawn(emit_messages(out_rx, config.emit_json));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => warn!(error = %e, "API server stopped"),
                Err(e) => warn!(error = %e, "API server task failed"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server stopped");
        }
    }

    let _ = shutdown_tx.send(());
    for handle in loop_handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Check task failed during shutdown");
        }
    }
    if let Err(e) = output_handle.await {
        warn!(error = %e, "Output task failed during shutdown");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Merge one loop's output into the shared output channel
async fn forward(mut rx: mpsc::Receiver<Vec<MessageBody>>, tx: mpsc::Sender<Vec<MessageBody>>) {
    while let Some(messages) = rx.recv().await {
        if tx.send(messages).await.is_err() {
            break;
        }
    }
}

/// Write every message as one JSON line on stdout
async fn emit_messages(mut rx: mpsc::Receiver<Vec<MessageBody>>, emit_json: bool) {
    while let Some(messages) = rx.recv().await {
        if !emit_json {
            continue;
        }
        for message in &messages {
            match serde_json::to_string(message) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "Failed to serialize message"),
            }
        }
    }
}

/// Run a single check and print its messages. The process check needs a
/// baseline, so it runs twice.
async fn run_check_once(
    name: &str,
    check_config: Arc<CheckConfig>,
    provider: Arc<dyn SnapshotProvider>,
    container_source: Arc<dyn ContainerSource>,
) -> Result<()> {
    let window = check_config.cpu_sample_window;
    let mut check: Box<dyn Check> = match name {
        PROCESS_CHECK => Box::new(ProcessCheck::new(check_config, provider, container_source)),
        REALTIME_CHECK => Box::new(RealTimeCheck::new(check_config, provider)),
        other => bail!(
            "unknown check {:?}, expected {} or {}",
            other,
            PROCESS_CHECK,
            REALTIME_CHECK
        ),
    };
    let runs = if name == PROCESS_CHECK { 2 } else { 1 };

    let messages = tokio::task::spawn_blocking(move || {
        let mut messages = Vec::new();
        for group_id in 1..=runs {
            if group_id > 1 {
                std::thread::sleep(window);
            }
            messages = check.run(group_id)?;
        }
        Ok::<_, anyhow::Error>(messages)
    })
    .await
    .context("Check task panicked")??;

    println!("{}", serde_json::to_string_pretty(&messages)?);
    Ok(())
}
