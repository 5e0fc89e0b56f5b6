//! Error types for the server binary.
//!
//! [`AppError`] wraps every failure mode during startup and while the
//! worker and control surface run, so `main` can propagate with `?`.

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: catalyst_core::config::ConfigError,
    },

    /// The control surface could not be started.
    #[error("control surface error: {source}")]
    Startup {
        /// The underlying startup error.
        #[from]
        source: catalyst_observer::StartupError,
    },

    /// The control surface stopped serving.
    #[error("control surface error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: catalyst_observer::ServerError,
    },

    /// The simulation worker terminated with an error.
    #[error("worker error: {source}")]
    Worker {
        /// The underlying worker error.
        #[from]
        source: catalyst_core::error::WorkerError,
    },

    /// A background task panicked or was cancelled.
    #[error("task failed: {message}")]
    Task {
        /// Description of the join failure.
        message: String,
    },
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task {
            message: e.to_string(),
        }
    }
}
