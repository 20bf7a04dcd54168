//! Movies ETL Main Entry Point
//!
//! Keeps the search index in sync with the movies database, one incremental pass per
//! interval, until interrupted.

use dotenv::dotenv;
use movies_etl::config::LogFormat;
use movies_etl::orchestrator::ShutdownHandle;
use movies_etl::{AppConfig, Dependencies, EtlError};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
fn init_tracing(debug: bool, format: LogFormat) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "movies_etl={level},movies_etl_repository={level}",
            level = default_level
        ))
    });

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true),
                )
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
                .init();
        }
    }

    info!(
        service_name = "movies-etl",
        service_version = env!("CARGO_PKG_VERSION"),
        log_format = ?format,
        "Tracing initialized"
    );
}

/// Stop the orchestrator on Ctrl+C or SIGTERM.
fn spawn_signal_listener(handle: ShutdownHandle) {
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Stop requested, finishing current batch");
        handle.shutdown();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> Result<(), EtlError> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false, LogFormat::Pretty);
            error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };

    init_tracing(config.debug, config.log_format);

    info!("Starting movies ETL");

    // Startup waits for the index to come up; a signal must still end the process
    let initialized = tokio::select! {
        deps = Dependencies::new(&config) => deps,
        _ = wait_for_signal() => {
            warn!("Stop requested during startup");
            return Ok(());
        }
    };

    let mut deps = match initialized {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    spawn_signal_listener(deps.orchestrator.shutdown_handle());

    match deps.orchestrator.run().await {
        Ok(()) => {
            info!("Movies ETL stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Movies ETL failed");
            Err(e.into())
        }
    }
}
