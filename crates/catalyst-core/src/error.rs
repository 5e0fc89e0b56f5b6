//! Errors returned by [`WorkerController`](crate::controller::WorkerController) operations.

use catalyst_types::{ControlAction, WorkerRunState};

use crate::catalog::ValidationError;
use crate::engine::EngineError;
use crate::frame::FrameError;
use crate::merge::MergeConflict;

/// Failure of a control-surface operation.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ControlError {
    /// A parameter update failed validation and was not queued.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The parameter channel is full. The client may retry.
    #[error("parameter channel is full ({capacity} pending updates), retry later")]
    Backpressure {
        /// Channel capacity.
        capacity: usize,
    },

    /// The operation needs a started run.
    #[error("simulation is not running")]
    NotRunning,

    /// A run is in progress but no frame has been produced yet.
    #[error("no data available yet")]
    NoData,

    /// The worker is already in the state this action leads to.
    #[error("cannot {action}: simulation is already {state}")]
    AlreadyInState {
        /// Requested action.
        action: ControlAction,
        /// Current state.
        state: WorkerRunState,
    },

    /// The action is not allowed from the current state.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        /// Requested action.
        action: ControlAction,
        /// Current state.
        from: WorkerRunState,
    },

    /// The worker has terminated.
    #[error("simulation worker unavailable: {reason}")]
    WorkerUnavailable {
        /// Failure reason recorded by the worker, or a generic message.
        reason: String,
    },

    /// Static and dynamic metadata could not be combined.
    #[error(transparent)]
    Merge(#[from] MergeConflict),

    /// A payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl ControlError {
    /// Whether a client may retry the same request unchanged.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Backpressure { .. })
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Fatal worker failure, returned to the worker's supervisor.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WorkerError {
    /// The engine failed to allocate, step, or accept parameters.
    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),

    /// The engine produced observables that do not fit the model layout.
    #[error("engine produced an invalid frame: {0}")]
    Frame(#[from] FrameError),

    /// Simulated time went backwards within a run.
    #[error("simulated time went backwards from {previous} to {current}")]
    TimeReversal {
        /// Time of the previous frame, formatted.
        previous: String,
        /// Time of the rejected frame, formatted.
        current: String,
    },
}
