//! Core value types exchanged between the worker and its readers.
//!
//! All structs serialize with camelCase field names to match the
//! browser client's plotting code.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ParameterScale, WorkerRunState};
use crate::ids::RunId;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Instantaneous and time-integrated turnover frequency of one reaction channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TofValue {
    /// Rate over the most recent step batch.
    pub instant: f64,
    /// Rate averaged over the whole run.
    pub integrated: f64,
}

/// One timestamped snapshot of the simulation observables.
///
/// Produced once per worker iteration and never mutated afterwards.
/// `tof_values` follows the model's TOF channel order and
/// `coverage_values` follows the model's coverage label order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Frame {
    /// Simulated (kMC) time in seconds.
    pub time: f64,
    /// Per-channel turnover frequencies.
    pub tof_values: Vec<TofValue>,
    /// Per-species, per-site-type fractional coverages.
    pub coverage_values: Vec<f64>,
}

/// The item carried by the data channel: the freshest frame, the rolling
/// history window, and the lattice configuration for the 3D view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DataBundle {
    /// The run that produced this bundle.
    pub run_id: RunId,
    /// Number of completed step batches in this run.
    pub iteration: u64,
    /// The frame built after the latest step batch.
    pub frame: Frame,
    /// The most recent frames, oldest first (includes `frame` as the last entry).
    pub history: Vec<Frame>,
    /// Species index per lattice site (`-1` is an empty site).
    pub config: Vec<i32>,
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// A request to change one adjustable simulation parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ParameterUpdate {
    /// Name of the parameter (e.g. `T`, `p_COgas`).
    pub label: String,
    /// Requested new value.
    pub value: f64,
}

impl ParameterUpdate {
    /// Convenience constructor.
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Declared bounds and current value of one simulation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ParameterSpec {
    /// Lowest accepted value (inclusive).
    pub min: f64,
    /// Highest accepted value (inclusive).
    pub max: f64,
    /// Value currently applied to the engine.
    pub value: f64,
    /// Whether clients may change this parameter at runtime.
    pub adjustable: bool,
    /// Slider scale hint.
    #[serde(default)]
    pub scale: ParameterScale,
}

// ---------------------------------------------------------------------------
// Control surface responses
// ---------------------------------------------------------------------------

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct HealthReport {
    /// A run has been started and not reset since.
    pub has_started: bool,
    /// The worker is suspended at an iteration boundary.
    pub is_paused: bool,
    /// Full run state.
    pub state: WorkerRunState,
    /// The current run.
    pub run_id: RunId,
    /// Reason the worker terminated, if it did.
    pub failure: Option<String>,
    /// RFC 3339 timestamp of the last successful `start`, if any.
    pub started_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_uses_camel_case() {
        let frame = Frame {
            time: 1.5,
            tof_values: vec![TofValue {
                instant: 2.0,
                integrated: 1.0,
            }],
            coverage_values: vec![0.25],
        };
        let json = serde_json::to_value(&frame).ok();
        let json = json.unwrap_or_default();
        assert!(json.get("tofValues").is_some());
        assert!(json.get("coverageValues").is_some());
    }
}
