//! Linepace - Production Line Speed Governor
//!
//! Real-time cycle-time driven conveyor control: ingests CT telemetry,
//! derives a clamped line speed and a ramp-limited output voltage, persists
//! every decision, and forwards it downstream best-effort.
//!
//! # Usage
//!
//! ```bash
//! # Run against the live cycle-time feed from linepace.toml
//! cargo run --release
//!
//! # Run with simulation input from stdin
//! ct-simulation | linepace --stdin
//!
//! # Connect to a specific feed
//! linepace --bus-tcp localhost:9001
//! ```
//!
//! # Environment Variables
//!
//! - `LINEPACE_CONFIG`: Path to the TOML config (default: ./linepace.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use linepace::api::{create_app, ApiState};
use linepace::config::ControllerConfig;
use linepace::control::ControlPipeline;
use linepace::forward::{run_forward_worker, spawn_queue, ForwardHandle, ResultForwarder};
use linepace::ingest::{BusHealth, IngestLoop, SampleSource, StdinSource, TcpSource};
use linepace::storage::ControlLogStore;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "linepace")]
#[command(about = "Production line speed governor")]
#[command(version)]
struct CliArgs {
    /// Read cycle-time messages from stdin (JSON, one per line)
    /// Use with the simulator: ct-simulation | linepace --stdin
    #[arg(long)]
    stdin: bool,

    /// Connect to a cycle-time feed at HOST:PORT (overrides [bus].addr)
    #[arg(long, value_name = "HOST:PORT")]
    bus_tcp: Option<String>,

    /// Override the server address (default from [server].addr)
    #[arg(short, long)]
    addr: Option<String>,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Ingest,
    ForwardWorker(usize),
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::Ingest => write!(f, "Ingest"),
            TaskName::ForwardWorker(id) => write!(f, "ForwardWorker-{id}"),
        }
    }
}

// ============================================================================
// Task Spawning
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the forward worker pool. Returns the producer handle, or `None`
/// when the callback is disabled.
fn spawn_forward_workers(
    task_set: &mut JoinSet<Result<TaskName>>,
    config: &ControllerConfig,
    cancel_token: &CancellationToken,
) -> Option<ForwardHandle> {
    if !config.callback.enabled {
        info!("Result forwarding disabled ([callback].enabled = false)");
        return None;
    }

    let forwarder = Arc::new(ResultForwarder::new(&config.callback));
    let (handle, receiver) = spawn_queue(config.callback.queue_capacity);

    info!(
        url = %config.callback.url,
        workers = config.callback.workers,
        queue_capacity = config.callback.queue_capacity,
        "Result forwarding enabled"
    );

    for worker_id in 0..config.callback.workers {
        let receiver = receiver.clone();
        let forwarder = Arc::clone(&forwarder);
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            run_forward_worker(worker_id, receiver, forwarder, cancel).await;
            Ok(TaskName::ForwardWorker(worker_id))
        });
    }

    Some(handle)
}

/// Spawn the ingest task driving samples from a source into the pipeline.
fn spawn_ingest<S: SampleSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    mut source: S,
    ingest: IngestLoop,
) {
    task_set.spawn(async move {
        info!("[Ingest] Task starting");
        let stats = ingest.run(&mut source).await;
        info!(
            processed = stats.messages_processed,
            dropped = stats.messages_dropped,
            "[Ingest] Task finished"
        );
        Ok(TaskName::Ingest)
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let config = ControllerConfig::load();
    config.validate().context("Invalid configuration")?;

    let server_addr = args.addr.unwrap_or_else(|| config.server.addr.clone());

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Linepace - Production Line Speed Governor");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "  Speed band: [{}, {}] | Voltage range: [{} V, {} V] | Ramp: {} V/s",
        config.control.speed_min,
        config.control.speed_max,
        config.control.voltage_min,
        config.control.voltage_max,
        config.control.ramp_rate_v_per_sec,
    );
    info!("");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    // Control log storage — a failed open degrades to no persistence
    // rather than aborting: output correctness outranks telemetry durability.
    let store = match ControlLogStore::open(config.storage.control_log_path()) {
        Ok(store) => {
            info!(
                path = %config.storage.control_log_path().display(),
                records = store.count(),
                "Control log storage initialized"
            );
            Some(store)
        }
        Err(e) => {
            warn!(error = %e, "Failed to open control log storage — running without persistence");
            None
        }
    };

    // Shared control pipeline
    let pipeline = Arc::new(ControlPipeline::new(config.control.clone()));
    let bus_health = Arc::new(BusHealth::default());

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Forward worker pool
    let forward = spawn_forward_workers(&mut task_set, &config, &cancel_token);

    // HTTP server
    let api_state = ApiState::new(
        Arc::clone(&pipeline),
        store.clone(),
        forward.clone(),
        Arc::clone(&bus_health),
        config.callback.enabled,
    );
    let app = create_app(api_state);
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {server_addr}"))?;
    info!("HTTP server listening on {}", server_addr);
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());

    // Ingest task — stdin for piped simulation, TCP for the live feed.
    let ingest = IngestLoop::new(
        Arc::clone(&pipeline),
        store.clone(),
        forward,
        Arc::clone(&bus_health),
        cancel_token.clone(),
    );

    if args.stdin {
        info!("Input: stdin (JSON cycle-time messages)");
        spawn_ingest(
            &mut task_set,
            StdinSource::new(Arc::clone(&bus_health)),
            ingest,
        );
    } else if let Some(addr) = args
        .bus_tcp
        .clone()
        .or_else(|| config.bus.enabled.then(|| config.bus.addr.clone()))
    {
        info!("Input: cycle-time feed at {}", addr);
        let source = TcpSource::new(&addr, config.bus.read_timeout_secs, Arc::clone(&bus_health))?;
        spawn_ingest(&mut task_set, source, ingest);
    } else {
        warn!("Bus feed disabled and no --stdin — only the manual command API is active");
    }

    let result = run_supervisor(&mut task_set, cancel_token).await;

    if let Some(store) = store {
        if let Err(e) = store.flush() {
            warn!(error = %e, "Failed to flush control log on shutdown");
        }
    }

    info!("");
    info!("Linepace shutdown complete");
    result
}
