//! The boundary between the worker and a kinetic Monte Carlo engine.
//!
//! The worker never looks inside an engine. It asks an [`EngineFactory`]
//! for a fresh instance when a run starts, advances it in step batches,
//! pushes committed parameter values into it, and reads an
//! [`EngineSnapshot`] after every batch. Step batches run on the blocking
//! thread pool, so engines must be [`Send`].

use std::collections::BTreeMap;

use crate::model::ModelDefinition;

/// Errors reported by an engine or its factory.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine could not be created for the given model.
    #[error("engine allocation failed: {0}")]
    Allocation(String),

    /// A step batch failed.
    #[error("step batch failed: {0}")]
    Step(String),

    /// The engine rejected a parameter set.
    #[error("engine rejected parameters: {0}")]
    Parameters(String),

    /// The blocking task running the batch panicked or was cancelled.
    #[error("engine task aborted: {0}")]
    Aborted(String),
}

/// Raw observables read from an engine after a step batch.
///
/// Shapes follow [`ObservableLayout`](crate::model::ObservableLayout):
/// `occupation[species][site_type]`, one TOF entry per channel, one
/// configuration entry per lattice site.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineSnapshot {
    /// Simulated time in seconds since the run began.
    pub time: f64,
    /// Fractional coverage per species and site type.
    pub occupation: Vec<Vec<f64>>,
    /// Turnover frequency over the most recent batch, per channel.
    pub tof_instant: Vec<f64>,
    /// Turnover frequency averaged over the whole run, per channel.
    pub tof_integrated: Vec<f64>,
    /// Species index per lattice site (`-1` for empty).
    pub config: Vec<i32>,
}

/// A running simulation instance.
pub trait SimulationEngine: Send + 'static {
    /// Execute `steps` elementary kMC steps.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Step`] if the engine cannot continue. The
    /// worker treats this as fatal for the run.
    fn advance(&mut self, steps: u64) -> Result<(), EngineError>;

    /// Read the current observables.
    fn snapshot(&self) -> EngineSnapshot;

    /// Replace the parameter values used for subsequent steps.
    ///
    /// `values` holds the full committed parameter set, not a delta.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Parameters`] if the engine cannot apply them.
    fn apply_parameters(&mut self, values: &BTreeMap<String, f64>) -> Result<(), EngineError>;
}

/// Creates engine instances. Shared between the controller and the worker.
pub trait EngineFactory: Send + Sync {
    /// Allocate a fresh engine at simulated time zero.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Allocation`] if the model cannot be simulated.
    fn allocate(
        &self,
        model: &ModelDefinition,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<Box<dyn SimulationEngine>, EngineError>;
}
