//! Enumeration types shared between the worker and the control surface.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Worker run state
// ---------------------------------------------------------------------------

/// Whether the simulation worker is currently issuing step batches.
///
/// Transitions only through explicit control actions:
/// `Stopped -> Running <-> Paused`, and `Running | Paused -> Stopped` on reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum WorkerRunState {
    /// No run in progress. The engine may or may not be allocated.
    #[default]
    Stopped,
    /// The pacing loop is stepping the engine.
    Running,
    /// The loop is suspended at an iteration boundary.
    Paused,
}

impl WorkerRunState {
    /// Whether a run has been started and not reset since.
    pub const fn has_started(self) -> bool {
        !matches!(self, Self::Stopped)
    }

    /// Whether the loop is suspended.
    pub const fn is_paused(self) -> bool {
        matches!(self, Self::Paused)
    }
}

impl core::fmt::Display for WorkerRunState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Control actions
// ---------------------------------------------------------------------------

/// A control command issued against the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ControlAction {
    /// `Stopped -> Running`.
    Start,
    /// `Running -> Paused`.
    Pause,
    /// `Paused -> Running`.
    Resume,
    /// `Running | Paused -> Stopped`, discarding the current run.
    Reset,
}

impl core::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Reset => "reset",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Parameter scale
// ---------------------------------------------------------------------------

/// How a slider should map its position onto the parameter range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ParameterScale {
    /// Evenly spaced values between `min` and `max`.
    #[default]
    Linear,
    /// Logarithmically spaced values (pressures spanning many decades).
    Log,
}
