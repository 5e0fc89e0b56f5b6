//! Catalyst Live server binary.
//!
//! Wires the lattice kMC engine, the simulation worker, and the HTTP
//! control surface together and runs until the worker fails, the server
//! stops, or `Ctrl-C` is received.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`CATALYST_CONFIG`, default `catalyst-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Spawn the worker with a [`LatticeFactory`]
//! 4. Bind and spawn the control surface on `PORT` (default 3001)
//! 5. Wait for the first of: worker exit, server exit, `Ctrl-C`

mod error;
mod lattice;

use std::path::Path;
use std::sync::Arc;

use catalyst_core::config::{CatalystConfig, LoggingConfig};
use catalyst_core::controller::WorkerController;
use catalyst_observer::{AppState, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;
use crate::lattice::LatticeFactory;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the port cannot be
/// bound, or the worker terminates with an engine failure.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let path = CatalystConfig::path_from_env();
    let (config, from_file) = load_config(&path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("catalyst-engine starting");
    info!(
        path = %path.display(),
        from_file,
        model = config.model.name,
        sites = config.model.site_count(),
        steps_per_frame = config.worker.steps_per_frame,
        frame_rate_hz = config.worker.frame_rate_hz,
        history_capacity = config.worker.history_capacity,
        parameter_channel_capacity = config.worker.parameter_channel_capacity,
        "Configuration loaded"
    );

    // 3. Spawn the worker.
    let server_config = ServerConfig::from(&config.server);
    let CatalystConfig { worker, model, .. } = config;
    let factory = Arc::new(LatticeFactory::new(worker.seed));
    let (controller, worker) = WorkerController::spawn(worker, model, factory);

    // 4. Start the control surface.
    let state = Arc::new(AppState::new(controller));
    let server = catalyst_observer::spawn_observer(&server_config, state).await?;
    info!(host = server_config.host, port = server_config.port, "Control surface started");

    // 5. Run until something stops.
    tokio::select! {
        result = worker => {
            let summary = result?.inspect_err(|e| error!(error = %e, "Worker failed"))?;
            info!(frames = summary.frames, runs = summary.runs, "Worker exited");
        }
        result = server => {
            result??;
            info!("Control surface stopped");
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown requested");
        }
    }

    info!("catalyst-engine shutdown complete");
    Ok(())
}

/// Load configuration from `path`, or defaults (plus `PORT`) when the file
/// does not exist.
fn load_config(path: &Path) -> Result<(CatalystConfig, bool), AppError> {
    if path.exists() {
        Ok((CatalystConfig::from_file(path)?, true))
    } else {
        Ok((CatalystConfig::parse("")?, false))
    }
}

/// `RUST_LOG` wins over `logging.level`; `logging.json` selects JSON lines.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
