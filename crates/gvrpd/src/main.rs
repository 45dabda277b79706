//! gvrpd - GARP VLAN Registration Protocol Daemon
//!
//! Entry point for the gvrpd daemon.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sonic_gvrpd::{DaemonConfig, GvrpDaemon};

#[derive(Debug, Parser)]
#[command(name = "gvrpd", version, about = "GARP VLAN Registration Protocol daemon")]
struct Args {
    /// Configuration file (TOML). Built-in defaults are used when absent.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Initializes tracing/logging subsystem
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{}'", level))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("gvrpd: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting gvrpd ---");

    match run(args).await {
        Ok(()) => {
            info!("gvrpd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "gvrpd exiting with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => DaemonConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    info!(
        ports = config.gvrp.ports,
        max_vlans = config.gvrp.max_vlans,
        tick_interval_ms = config.runtime.tick_interval_ms,
        "configuration loaded"
    );

    let GvrpDaemon {
        handle,
        mut frames,
        mut membership,
        task,
    } = GvrpDaemon::spawn(config).context("failed to start GVRP actor")?;

    // Frame I/O belongs to the platform layer; log what would be sent.
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            debug!(port = frame.port, len = frame.frame.len(), "PDU out");
        }
    });
    tokio::spawn(async move {
        while let Some(change) = membership.recv().await {
            info!(port = change.port, vid = %change.vid, kind = ?change.kind, "VLAN membership changed");
        }
    });

    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("received shutdown signal");

    let withdrawn = handle.shutdown().await?;
    info!(withdrawn = withdrawn.len(), "GVRP declarations withdrawn");
    task.await.context("GVRP actor panicked")?;
    Ok(())
}
