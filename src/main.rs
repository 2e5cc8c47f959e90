//! transit-nav - replay driver for the navigation core
//!
//! Feeds a recorded fix trace and an itinerary through a navigation session
//! and writes every alert channel action as a structured log line. Used for
//! field-log analysis and local testing without a GPS receiver.
//!
//! Module structure:
//! - `domain/` - Core types (fixes, zones, alerts, itinerary)
//! - `io/` - Host interfaces (location source, notification platform, traces)
//! - `services/` - Pipeline (filter, proximity, arbiter, dispatch, session)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use transit_nav::domain::Itinerary;
use transit_nav::infra::{Config, Metrics};
use transit_nav::io::{load_trace, Capabilities, LogPlatform, NotificationPlatform, TraceSource};
use transit_nav::services::{create_dispatch_worker, run_session, NavigationSession};

/// Replay a location trace against an itinerary
#[derive(Parser, Debug)]
#[command(name = "transit-nav", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Itinerary JSON (legs + destination)
    #[arg(short, long)]
    itinerary: PathBuf,

    /// JSONL fix trace
    #[arg(short, long)]
    trace: PathBuf,

    /// Pace the replay by the recorded fix timestamps
    #[arg(long)]
    realtime: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug to see every filtered position
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "transit-nav starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        min_accuracy_m = %config.min_accuracy_meters(),
        update_interval_ms = %config.update_interval_ms(),
        speech = %config.speech_enabled(),
        metrics_interval_secs = %config.metrics_interval_secs(),
        "config_loaded"
    );

    let itinerary = Itinerary::from_file(&args.itinerary)?;
    let trace = load_trace(&args.trace)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let platform = Arc::new(LogPlatform::new(Capabilities::all()));
    let capabilities = platform.capabilities();
    let (dispatch_tx, dispatch_worker) =
        create_dispatch_worker(platform, metrics.clone(), config.dispatch_queue_size());
    let worker_handle = tokio::spawn(dispatch_worker.run());

    let mut session = NavigationSession::new(config, capabilities, dispatch_tx, metrics.clone());
    session.load_itinerary(&itinerary).context("Failed to build zones from itinerary")?;

    // Zone events as a UI would receive them
    let (_, mut events_rx) = session.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            info!(
                zone_id = %event.zone.id(),
                zone = %event.zone.name(),
                level = %event.level,
                distance_m = %event.distance_m.round(),
                bearing_deg = %event.bearing_deg.round(),
                "zone_event"
            );
        }
    });

    let source = TraceSource::new(trace).paced(args.realtime);
    let fix_rx = session
        .start_tracking(Box::new(source))?
        .context("Location watch already active")?;

    let shared = Arc::new(parking_lot::Mutex::new(session));

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run session - consumes fixes until the trace ends or shutdown
    run_session(shared.clone(), fix_rx, shutdown_rx).await;

    {
        let mut session = shared.lock();
        for alert in session.arbiter().active_alerts() {
            info!(id = %alert.id, priority = %alert.priority, message = %alert.message, "alert_active_at_end");
        }
        session.end_journey();
    }

    // Dropping the session closes the dispatch queue; the worker drains and exits
    drop(shared);
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "alert_dispatch_worker_panicked");
    }

    metrics.report().log();
    info!("transit-nav shutdown complete");
    Ok(())
}
