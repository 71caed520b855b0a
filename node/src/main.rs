// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MyCash Node
//!
//! Entry point for the `mycash-node` binary. Parses CLI arguments,
//! initializes logging and metrics, boots the hosted roster and serves the
//! operator API.
//!
//! - `run`     — boot the roster and serve until interrupted
//! - `demo`    — run the scripted scenario on an in-memory roster
//! - `version` — print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;
mod roster;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use cli::{Commands, CommonArgs, MyCashNodeCli};
use config::NodeConfig;
use metrics::NodeMetrics;
use roster::Roster;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = MyCashNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Demo(args) => run_demo(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn load_config(common: &CommonArgs) -> Result<NodeConfig> {
    match &common.config {
        Some(path) => NodeConfig::load(path),
        None => Ok(NodeConfig::default()),
    }
}

/// Boots the roster, then serves the API and metrics endpoints.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.common.log_format);

    let mut config = load_config(&args.common)?;
    if let Some(dir) = args.data_dir.clone() {
        config.data_dir = Some(dir);
    }
    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        parties = config.parties.len(),
        data_dir = ?config.data_dir,
        "starting mycash-node"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Roster ---
    let roster = Arc::new(Roster::boot(&config, Arc::clone(&node_metrics))?);
    if args.seed_demo {
        let report = scenario::run(&roster).await.context("demo scenario failed")?;
        tracing::info!(transactions = report.transactions.len(), "demo data seeded");
    }

    // --- API server ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            mycash_protocol::config::PROTOCOL_VERSION,
        ),
        roster: Arc::clone(&roster),
    };
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    match Arc::try_unwrap(roster) {
        Ok(roster) => roster.shutdown(),
        Err(_) => tracing::warn!("roster still in use at shutdown, skipping flush"),
    }
    tracing::info!("mycash-node stopped");
    Ok(())
}

/// Runs the scripted scenario on a throwaway roster and prints the report.
async fn run_demo(args: cli::DemoArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.common.log_format);

    let mut config = load_config(&args.common)?;
    config.data_dir = None;
    let roster = Roster::boot(&config, Arc::new(NodeMetrics::new()))?;
    let report = scenario::run(&roster).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render demo report")?
    );
    roster.shutdown();
    Ok(())
}

fn print_version() {
    println!("mycash-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", mycash_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
