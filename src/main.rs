#![forbid(unsafe_code)]

//! `netaware`: connectivity awareness daemon.
//!
//! Loads configuration, opens the history database, bootstraps a session
//! and keeps probing reachability until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use netaware::config::GlobalConfig;
use netaware::lifecycle::ConnectivityLifecycle;
use netaware::network::monitor::CapabilityMonitor;
use netaware::network::StaticCapabilitySource;
use netaware::orchestrator::{BootstrapOrchestrator, Stores};
use netaware::persistence::capabilities_repo::CapabilitiesRepo;
use netaware::persistence::db;
use netaware::persistence::network_state_repo::NetworkStateRepo;
use netaware::persistence::session_repo::SessionRepo;
use netaware::probe::{HttpReachabilityTest, ProbeConfig, ReachabilityProber, SystemClock};
use netaware::signal::shared_reachability;
use netaware::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "netaware", about = "Connectivity awareness daemon", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("netaware bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    info!(path = %config.db_path.display(), "database connected");

    let stores = Stores {
        sessions: Arc::new(SessionRepo::new(Arc::clone(&db))),
        states: Arc::new(NetworkStateRepo::new(Arc::clone(&db))),
        capabilities: Arc::new(CapabilitiesRepo::new(Arc::clone(&db))),
    };

    // ── Connectivity sources ────────────────────────────
    let monitor = Arc::new(CapabilityMonitor::new(Arc::new(
        StaticCapabilitySource::from_config(&config.connectivity),
    )));
    let tester = Arc::new(HttpReachabilityTest::new(&config.probe)?);
    info!(url = tester.url(), "reachability test configured");

    let probe_config = Arc::new(ProbeConfig::new(
        config.probe.min_interval_ms,
        config.probe.interval_ms,
    ));
    let prober = Arc::new(ReachabilityProber::new(
        probe_config,
        tester,
        Arc::clone(&monitor) as _,
        shared_reachability(),
        Arc::new(SystemClock),
    ));

    let orchestrator = Arc::new(BootstrapOrchestrator::new(
        stores,
        Arc::clone(&monitor) as _,
        config.retention.policy(),
    ));

    let lifecycle = ConnectivityLifecycle::new(
        config.lifecycle.clone(),
        orchestrator,
        Arc::clone(&prober),
        monitor,
    );

    // ── Run until interrupted ───────────────────────────
    if let Err(err) = lifecycle.on_resume() {
        warn!(%err, "bootstrap did not start");
    }
    info!("netaware ready");

    shutdown_signal().await;
    info!("shutdown signal received");

    lifecycle.on_stop();
    prober.shutdown().await;
    db.close().await;

    info!("netaware shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
