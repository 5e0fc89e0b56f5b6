//! The handle the control surface uses to drive the worker.
//!
//! [`WorkerController`] is cheap to clone and never waits on the worker:
//! control actions are applied to the shared control state, parameter
//! updates go through a bounded non-blocking queue, and reads come from
//! watch channels the worker publishes into.

use std::sync::Arc;

use catalyst_types::{
    ControlAction, Frame, HealthReport, ParameterUpdate, RunId, WorkerRunState,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::catalog::ParameterCatalog;
use crate::channel::{DataChannel, Delivery, ParameterChannel, parameter_channel};
use crate::config::WorkerConfig;
use crate::engine::EngineFactory;
use crate::error::{ControlError, WorkerError};
use crate::initial;
use crate::model::ModelDefinition;
use crate::operator::OperatorState;
use crate::worker::{Worker, WorkerChannels, WorkerSummary};

/// Clonable handle to a running worker.
#[derive(Clone)]
pub struct WorkerController {
    operator: Arc<OperatorState>,
    parameters: ParameterChannel,
    data: DataChannel,
    catalog: watch::Receiver<Arc<ParameterCatalog>>,
    model: Arc<ModelDefinition>,
}

impl std::fmt::Debug for WorkerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerController")
            .field("state", &self.operator.current())
            .field("model", &self.model.name)
            .finish_non_exhaustive()
    }
}

impl WorkerController {
    /// Spawn the worker task and return its controller and join handle.
    ///
    /// The worker stops cleanly once every controller clone is dropped.
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        config: WorkerConfig,
        model: ModelDefinition,
        factory: Arc<dyn EngineFactory>,
    ) -> (Self, JoinHandle<Result<WorkerSummary, WorkerError>>) {
        let model = Arc::new(model);
        let (operator, control) = OperatorState::new();
        let operator = Arc::new(operator);
        let (parameters, inbox) = parameter_channel(config.parameter_channel_capacity);
        let data = DataChannel::new(control.borrow().run_id);
        let (catalog_tx, catalog) =
            watch::channel(Arc::new(ParameterCatalog::from_model(&model)));

        let worker = Worker::new(
            config,
            Arc::clone(&model),
            factory,
            WorkerChannels {
                operator: Arc::clone(&operator),
                control,
                inbox,
                data: data.clone(),
                catalog: catalog_tx,
            },
        );
        let handle = tokio::spawn(worker.run());

        let controller = Self {
            operator,
            parameters,
            data,
            catalog,
            model,
        };
        (controller, handle)
    }

    /// Current liveness and run state.
    pub fn health(&self) -> HealthReport {
        let mut report = self.operator.current().health();
        if report.failure.is_none() && self.parameters.is_closed() {
            report.failure = Some(String::from("worker has exited"));
        }
        report
    }

    /// `Stopped -> Running`.
    pub fn start(&self) -> Result<HealthReport, ControlError> {
        self.act(ControlAction::Start)
    }

    /// `Running -> Paused`.
    pub fn pause(&self) -> Result<HealthReport, ControlError> {
        self.act(ControlAction::Pause)
    }

    /// `Paused -> Running`.
    pub fn resume(&self) -> Result<HealthReport, ControlError> {
        self.act(ControlAction::Resume)
    }

    /// Discard the current run: new run id, empty data slot, and the
    /// worker drops its engine and history at its next boundary.
    ///
    /// A rejected reset leaves the data slot as it was.
    pub fn reset(&self) -> Result<HealthReport, ControlError> {
        let run_id = RunId::new();
        let outcome = self.operator.reset(run_id);
        if outcome.is_ok() {
            self.data.drain(run_id);
        }
        Self::log_outcome(ControlAction::Reset, outcome)
    }

    fn act(&self, action: ControlAction) -> Result<HealthReport, ControlError> {
        Self::log_outcome(action, self.operator.apply(action))
    }

    fn log_outcome(
        action: ControlAction,
        outcome: Result<crate::operator::ControlState, ControlError>,
    ) -> Result<HealthReport, ControlError> {
        match outcome {
            Ok(state) => {
                info!(
                    %action,
                    state = %state.run_state,
                    run_id = %state.run_id,
                    "Control action applied"
                );
                Ok(state.health())
            }
            Err(e) => {
                warn!(%action, error = %e, "Control action rejected");
                Err(e)
            }
        }
    }

    /// Validate an update against the current catalog and queue it for
    /// the current run. A reset before the worker commits it discards it.
    ///
    /// # Errors
    ///
    /// [`ControlError::Validation`] for unknown, fixed, non-finite or out
    /// of range values, [`ControlError::Backpressure`] when the queue is
    /// full.
    pub fn submit(&self, update: ParameterUpdate) -> Result<(), ControlError> {
        self.catalog.borrow().validate(&update)?;
        self.parameters.submit(self.operator.run_id(), update)
    }

    /// Take the latest bundle from the data channel.
    ///
    /// While paused this returns the last bundle published before the
    /// pause.
    ///
    /// # Errors
    ///
    /// [`ControlError::NotRunning`] while stopped and
    /// [`ControlError::NoData`] before the first frame of a run.
    pub fn consume(&self) -> Result<Delivery, ControlError> {
        self.require_started()?;
        self.data.consume().ok_or(ControlError::NoData)
    }

    /// The rolling history window of the current run, oldest first.
    pub fn history(&self) -> Result<Vec<Frame>, ControlError> {
        self.require_started()?;
        Ok(self
            .data
            .peek()
            .map(|bundle| bundle.history.clone())
            .unwrap_or_default())
    }

    fn require_started(&self) -> Result<(), ControlError> {
        let state = self.operator.current();
        if let Some(reason) = state.failure {
            return Err(ControlError::WorkerUnavailable { reason });
        }
        if state.run_state == WorkerRunState::Stopped {
            return Err(ControlError::NotRunning);
        }
        Ok(())
    }

    /// The `GET /initial` document for the current model, catalog and
    /// latest bundle.
    pub fn initial(&self) -> Result<serde_json::Value, ControlError> {
        let catalog = Arc::clone(&self.catalog.borrow());
        let bundle = self.data.peek();
        initial::initial_document(&self.model, &catalog, bundle.as_deref())
    }

    /// Snapshot of the committed parameter catalog.
    pub fn catalog(&self) -> Arc<ParameterCatalog> {
        Arc::clone(&self.catalog.borrow())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::cast_precision_loss,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;
    use crate::catalog::ValidationError;
    use crate::engine::{EngineError, EngineSnapshot, SimulationEngine};
    use crate::model::{
        LatticeSize, ObservableLayout, ParameterDefinition, ProcessDefinition, SiteDefinition,
        SpeciesDefinition, UnitCell,
    };

    struct ClockEngine {
        layout: ObservableLayout,
        time: f64,
        batches: u64,
        delay: Duration,
        fail_after: Option<u64>,
    }

    impl SimulationEngine for ClockEngine {
        fn advance(&mut self, steps: u64) -> Result<(), EngineError> {
            if self.fail_after.is_some_and(|n| self.batches >= n) {
                return Err(EngineError::Step(String::from("lattice exhausted")));
            }
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.batches += 1;
            self.time += steps as f64 * 1e-6;
            Ok(())
        }

        fn snapshot(&self) -> EngineSnapshot {
            EngineSnapshot {
                time: self.time,
                occupation: vec![vec![0.0; self.layout.sites.len()]; self.layout.species.len()],
                tof_instant: vec![0.0; self.layout.tof_channels.len()],
                tof_integrated: vec![0.0; self.layout.tof_channels.len()],
                config: vec![-1; self.layout.site_count],
            }
        }

        fn apply_parameters(&mut self, _values: &BTreeMap<String, f64>) -> Result<(), EngineError> {
            Ok(())
        }
    }

    /// Hands out [`ClockEngine`]s that sleep `delay` per batch and fail
    /// once `fail_after` batches have run.
    #[derive(Default)]
    struct ClockFactory {
        delay: Duration,
        fail_after: Option<u64>,
    }

    impl EngineFactory for ClockFactory {
        fn allocate(
            &self,
            model: &ModelDefinition,
            _parameters: &BTreeMap<String, f64>,
        ) -> Result<Box<dyn SimulationEngine>, EngineError> {
            Ok(Box::new(ClockEngine {
                layout: ObservableLayout::from_model(model),
                time: 0.0,
                batches: 0,
                delay: self.delay,
                fail_after: self.fail_after,
            }))
        }
    }

    /// One species on one site with a single adjustable parameter `k` in `[0, 1]`.
    fn unit_model() -> ModelDefinition {
        ModelDefinition {
            name: String::from("unit"),
            cell: UnitCell { a: 1.0, b: 1.0, c: 1.0 },
            size: LatticeSize { x: 1, y: 1 },
            surface: Vec::new(),
            sites: vec![SiteDefinition {
                name: String::from("a"),
                position: [0.0; 3],
            }],
            species: vec![SpeciesDefinition {
                name: String::from("X"),
                atoms: Vec::new(),
                color: None,
            }],
            tof_channels: Vec::new(),
            parameters: vec![
                ParameterDefinition {
                    label: String::from("T"),
                    value: 300.0,
                    min: None,
                    max: None,
                    adjustable: false,
                    scale: catalyst_types::ParameterScale::Linear,
                },
                ParameterDefinition {
                    label: String::from("k"),
                    value: 0.5,
                    min: Some(0.0),
                    max: Some(1.0),
                    adjustable: true,
                    scale: catalyst_types::ParameterScale::Linear,
                },
            ],
            temperature_parameter: String::from("T"),
            processes: vec![ProcessDefinition {
                from: Some(String::from("X")),
                prefactor: 1.0,
                ..ProcessDefinition::named("X_desorption")
            }],
        }
    }

    fn fast_config(capacity: usize) -> WorkerConfig {
        WorkerConfig {
            steps_per_frame: 10,
            frame_rate_hz: 500.0,
            history_capacity: 4,
            parameter_channel_capacity: capacity,
            seed: None,
        }
    }

    fn spawn(capacity: usize) -> WorkerController {
        spawn_with(capacity, ClockFactory::default()).0
    }

    fn spawn_with(
        capacity: usize,
        factory: ClockFactory,
    ) -> (WorkerController, JoinHandle<Result<WorkerSummary, WorkerError>>) {
        WorkerController::spawn(fast_config(capacity), unit_model(), Arc::new(factory))
    }

    fn k_is(catalog: &ParameterCatalog, value: f64) -> bool {
        catalog.get("k").is_some_and(|s| (s.value - value).abs() < 1e-12)
    }

    async fn poll_consume(controller: &WorkerController) -> Delivery {
        for _ in 0..500 {
            if let Ok(delivery) = controller.consume() {
                return delivery;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        controller.consume().unwrap()
    }

    #[tokio::test]
    async fn submit_rejects_invalid_updates_and_leaves_catalog_unchanged() {
        let controller = spawn(10);
        let before = controller.catalog();

        assert_eq!(
            controller.submit(ParameterUpdate::new("not_a_param", 0.1)),
            Err(ControlError::Validation(ValidationError::UnknownLabel(
                String::from("not_a_param")
            )))
        );
        assert!(matches!(
            controller.submit(ParameterUpdate::new("T", 310.0)),
            Err(ControlError::Validation(ValidationError::NotAdjustable(_)))
        ));
        assert!(matches!(
            controller.submit(ParameterUpdate::new("k", 10.0)),
            Err(ControlError::Validation(ValidationError::OutOfRange { .. }))
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*controller.catalog(), *before);
    }

    #[tokio::test]
    async fn consume_requires_started_run() {
        let controller = spawn(10);
        assert_eq!(controller.consume().unwrap_err(), ControlError::NotRunning);
        assert_eq!(controller.history().unwrap_err(), ControlError::NotRunning);
    }

    #[tokio::test]
    async fn consume_while_paused_returns_last_bundle() {
        let controller = spawn(10);
        controller.start().unwrap();
        poll_consume(&controller).await;
        controller.pause().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let first = controller.consume().unwrap();
        let second = controller.consume().unwrap();
        assert_eq!(first.bundle.iteration, second.bundle.iteration);
        assert!(!second.fresh);
        assert!(!controller.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_then_start_restarts_time() {
        let controller = spawn(10);
        controller.start().unwrap();
        let before = poll_consume(&controller).await;

        let health = controller.reset().unwrap();
        assert_eq!(health.state, WorkerRunState::Stopped);
        assert_ne!(health.run_id, before.bundle.run_id);
        assert_eq!(controller.consume().unwrap_err(), ControlError::NotRunning);

        controller.start().unwrap();
        let after = poll_consume(&controller).await;
        assert_eq!(after.bundle.run_id, health.run_id);
        let expected = after.bundle.iteration as f64 * 10.0 * 1e-6;
        assert!((after.bundle.frame.time - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn backpressure_when_queue_full() {
        // The current-thread test runtime does not poll the worker between
        // these synchronous submissions, so nothing drains the queue.
        let controller = spawn(1);
        assert!(controller.submit(ParameterUpdate::new("k", 0.1)).is_ok());
        let err = controller.submit(ParameterUpdate::new("k", 0.2)).unwrap_err();
        assert_eq!(err, ControlError::Backpressure { capacity: 1 });
        assert!(err.is_retryable());

        let mut catalog = controller.catalog.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            catalog.wait_for(|c| k_is(c, 0.1)),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(controller.submit(ParameterUpdate::new("k", 0.2)).is_ok());
    }

    #[tokio::test]
    async fn initial_document_before_start() {
        let controller = spawn(10);
        let doc = controller.initial().unwrap();
        assert_eq!(doc["slider"].as_array().map(Vec::len), Some(1));
        assert_eq!(doc["visualization"]["config"], serde_json::json!([-1]));
        assert_eq!(doc["plots"]["plotData"]["kmcTime"], serde_json::json!(0.0));
    }

    #[tokio::test]
    async fn second_start_reports_already_running() {
        let controller = spawn(10);
        let health = controller.start().unwrap();
        assert!(health.has_started);
        assert!(matches!(
            controller.start(),
            Err(ControlError::AlreadyInState { .. })
        ));
        assert!(controller.health().failure.is_none());
    }

    #[tokio::test]
    async fn reset_from_paused_discards_run() {
        let controller = spawn(10);
        controller.start().unwrap();
        let before = poll_consume(&controller).await;
        controller.pause().unwrap();

        let health = controller.reset().unwrap();
        assert_eq!(health.state, WorkerRunState::Stopped);
        assert!(!health.is_paused);
        assert_ne!(health.run_id, before.bundle.run_id);
        assert!(controller.data.peek().is_none());
        assert_eq!(controller.history().unwrap_err(), ControlError::NotRunning);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn update_accepted_after_reset_survives_in_flight_batch() {
        let factory = ClockFactory {
            delay: Duration::from_millis(300),
            ..ClockFactory::default()
        };
        let (controller, _worker) = spawn_with(10, factory);
        controller.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The worker is still inside its first batch here.
        controller.reset().unwrap();
        controller.submit(ParameterUpdate::new("k", 0.9)).unwrap();

        let mut catalog = controller.catalog.clone();
        tokio::time::timeout(Duration::from_secs(5), catalog.wait_for(|c| k_is(c, 0.9)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(controller.health().state, WorkerRunState::Stopped);
    }

    #[tokio::test]
    async fn rejected_reset_leaves_data_slot_untouched() {
        let factory = ClockFactory {
            fail_after: Some(3),
            ..ClockFactory::default()
        };
        let (controller, worker) = spawn_with(10, factory);
        let run_id = controller.start().unwrap().run_id;
        let result = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());

        let before = controller.data.peek().unwrap();
        assert!(matches!(
            controller.reset(),
            Err(ControlError::WorkerUnavailable { .. })
        ));
        let after = controller.data.peek().unwrap();
        assert_eq!(after.run_id, run_id);
        assert_eq!(after.iteration, before.iteration);
        assert_eq!(controller.health().run_id, run_id);
        assert!(controller.health().failure.is_some());
    }
}
