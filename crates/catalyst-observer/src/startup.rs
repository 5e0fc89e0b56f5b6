//! Startup helper for embedding the control surface in the engine binary.
//!
//! ```rust,ignore
//! use catalyst_observer::startup::spawn_observer;
//! use catalyst_observer::{AppState, ServerConfig};
//! use std::sync::Arc;
//!
//! let state = Arc::new(AppState::new(controller));
//! let handle = spawn_observer(&ServerConfig::default(), state).await?;
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the control surface on a background Tokio task.
///
/// The listener is bound before the task is spawned, so an occupied port
/// is reported here rather than from the background task. The returned
/// handle resolves when the server stops.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address cannot be bound.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<Result<(), ServerError>>, StartupError> {
    let listener = config.bind().await?;
    let port = config.port;

    let handle = tokio::spawn(async move {
        let result = crate::server::serve(listener, state).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Control surface exited with error");
        }
        result
    });

    tracing::info!(port, "Control surface spawned on background task");

    Ok(handle)
}
