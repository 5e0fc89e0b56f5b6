//! Shared application state for the control surface.

use catalyst_core::controller::WorkerController;

/// State handed to every handler.
///
/// Handlers only talk to the worker through the [`WorkerController`],
/// whose operations never wait on the worker.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle to the simulation worker.
    pub controller: WorkerController,
}

impl AppState {
    /// Wrap a controller.
    pub const fn new(controller: WorkerController) -> Self {
        Self { controller }
    }
}
