//! autoscalerd — the autoscaler daemon.
//!
//! Single binary that assembles the autoscaler subsystems:
//! - State store (redb)
//! - Metrics collector (envelope ingest + history retention)
//! - Scaling decision engine
//! - Service broker (policy bind/unbind)
//! - REST API + Prometheus exposition
//!
//! # Usage
//!
//! ```text
//! autoscalerd run --config /etc/autoscaler/autoscaler.toml --port 8080
//! ```

mod config;
mod scaling_client;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use autoscaler_api::ApiState;
use autoscaler_broker::{BindingService, HttpScheduleRegistrar};
use autoscaler_engine::ScalingDecisionEngine;
use autoscaler_metrics::MetricsCollector;
use autoscaler_state::StateStore;

use crate::config::AutoscalerConfig;
use crate::scaling_client::HttpScalingClient;

#[derive(Parser)]
#[command(name = "autoscalerd", about = "Autoscaler control plane daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every subsystem in one process.
    #[command(alias = "standalone")]
    Run {
        /// Path to autoscaler.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("info,autoscalerd=debug,autoscaler=debug")
                }),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
        } => {
            let mut config = load_config(config)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.storage.data_dir = data_dir;
            }
            run(config).await
        }
        Command::Config { config } => {
            print!("{}", load_config(config)?.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AutoscalerConfig> {
    match path {
        Some(path) => {
            let config = AutoscalerConfig::from_file(&path)?;
            info!(path = ?path, "configuration loaded");
            Ok(config)
        }
        None => Ok(AutoscalerConfig::default()),
    }
}

async fn run(config: AutoscalerConfig) -> anyhow::Result<()> {
    info!("autoscaler daemon starting");

    std::fs::create_dir_all(&config.storage.data_dir)?;
    let db_path = config.storage.data_dir.join("autoscaler.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let collector = Arc::new(MetricsCollector::new(
        store.clone(),
        Duration::from_secs(config.collector.retention_secs),
        Duration::from_secs(config.collector.prune_interval_secs),
    ));
    let (envelope_tx, envelope_rx) = mpsc::channel(config.collector.channel_capacity);
    info!(
        retention_secs = config.collector.retention_secs,
        "metrics collector initialized"
    );

    let scheduler_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.scheduler.timeout_secs))
        .build()?;
    let registrar = HttpScheduleRegistrar::new(config.scheduler.url.clone(), scheduler_http);
    let bindings = Arc::new(BindingService::new(store.clone(), Arc::new(registrar)));
    info!(scheduler = %config.scheduler.url, "service broker initialized");

    let engine_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.scaling_engine.timeout_secs))
        .build()?;
    let scaling = HttpScalingClient::new(config.scaling_engine.url.clone(), engine_http);
    let shared_store = Arc::new(store.clone());
    let engine = Arc::new(ScalingDecisionEngine::new(
        shared_store.clone(),
        shared_store,
        collector.clone(),
        Arc::new(scaling),
        config.evaluator.engine_config(),
    ));
    info!(
        scaling_engine = %config.scaling_engine.url,
        interval_secs = config.evaluator.interval_secs,
        "decision engine initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector_shutdown = shutdown_rx.clone();
    let engine_shutdown = shutdown_rx.clone();

    // ── Start background tasks ─────────────────────────────────

    let collector_task = collector.clone();
    let collector_handle = tokio::spawn(async move {
        collector_task.run(envelope_rx, collector_shutdown).await;
    });

    let engine_handle = tokio::spawn(engine.run(engine_shutdown));

    // ── Start API server ───────────────────────────────────────

    let router = autoscaler_api::build_router(ApiState {
        store,
        collector,
        bindings,
        envelopes: envelope_tx,
    });
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = collector_handle.await;
    let _ = engine_handle.await;

    info!("autoscaler daemon stopped");
    Ok(())
}
