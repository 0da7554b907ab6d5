//! Cartelem Binary Entry Point
//!
//! Wires configuration, sources, sinks and the collection loop together
//! and runs until interrupted. Core functionality is provided by the
//! `cartelem` library crate.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartelem::config::AppConfig;
use cartelem::poller::CollectionLoop;
use cartelem::sink::registry::SinkRegistry;
use cartelem::source::gps::GpsSource;
use cartelem::source::obd::ObdSource;
use cartelem::source::sim::{SimulatedGps, SimulatedObd};
use cartelem::source::{MetricSource, PositionSource};

/// Cartelem - vehicle telemetry collector
#[derive(Parser, Debug)]
#[command(name = "cartelem", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "CARTELEM_CONFIG")]
    config: String,

    /// Use simulated OBD/GPS drivers instead of hardware
    #[arg(long, env = "CARTELEM_SIMULATE")]
    simulate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cartelem=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Configuration is missing or invalid");
            return ExitCode::FAILURE;
        }
    };

    // Sources. Real hardware drivers implement the ObdTransport and
    // GpsReceiver seams; the built-in drivers simulate a drive cycle.
    let source: Option<Arc<dyn MetricSource>> = if config.obd.enabled {
        if !cli.simulate {
            tracing::warn!("No hardware OBD driver linked, using the simulated adapter");
        }
        Some(Arc::new(ObdSource::new(SimulatedObd::new())))
    } else {
        tracing::info!("OBD disabled, no metrics will be collected");
        None
    };

    let position: Option<Arc<dyn PositionSource>> = if config.gps.enabled {
        if !cli.simulate {
            tracing::warn!(
                device = ?config.gps.device,
                "No hardware GPS driver linked, using the simulated receiver"
            );
        }
        Some(Arc::new(GpsSource::new(SimulatedGps::new())))
    } else {
        tracing::info!("GPS disabled, records will carry the zero fix");
        None
    };

    // Fault codes are captured once, before the loop starts.
    let fault_codes = match &source {
        Some(source) => source.fault_codes().await,
        None => Vec::new(),
    };
    if !fault_codes.is_empty() {
        tracing::warn!(codes = ?fault_codes, "Vehicle reports stored fault codes");
    }

    let registry = SinkRegistry::builtin();
    let sinks = registry.activate_all(&config.outputs).await;
    tracing::info!(active = sinks.len(), "Sink activation complete");

    let mut looper = CollectionLoop::new(config.obd.cadence())
        .with_warmup(config.obd.warmup_delay)
        .with_metrics(config.obd.metrics.clone())
        .with_metadata(config.vehicle.clone())
        .with_fault_codes(fault_codes)
        .with_sinks(sinks)
        .with_publish_timeout(config.outputs.publish_timeout);
    if let Some(source) = source {
        looper = looper.with_source(source);
    }
    if let Some(position) = position {
        looper = looper.with_position(position);
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let loop_task = tokio::spawn(looper.run(stop_rx));

    shutdown_signal().await;
    tracing::info!("Stop signal received, shutting down");
    let _ = stop_tx.send(true);

    if let Err(e) = loop_task.await {
        tracing::error!(error = %e, "Collection loop task failed");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
