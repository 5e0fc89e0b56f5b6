//! The simulation worker: a paced loop stepping the engine, publishing
//! frames and committing parameter updates.
//!
//! The worker is the single owner of the engine, the history window and
//! the parameter catalog. It reacts to control changes only at iteration
//! boundaries:
//!
//! 1. Observe the control state. A new run id means a reset happened:
//!    drop the engine, clear history, restore default parameters and
//!    discard updates queued against the old run.
//! 2. While `Running`, advance the engine by one step batch on the
//!    blocking pool, build a frame, append it to history and publish a
//!    bundle, then commit pending parameter updates in one batch.
//! 3. Sleep until the next frame deadline, waking early on control changes.
//!    Missed deadlines are not caught up.
//!
//! While `Stopped` or `Paused` the worker waits for a control change and
//! still commits parameter updates as they arrive.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use catalyst_types::{DataBundle, RunId, WorkerRunState};
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::catalog::ParameterCatalog;
use crate::channel::{DataChannel, ParameterInbox};
use crate::config::WorkerConfig;
use crate::engine::{EngineError, EngineFactory, SimulationEngine};
use crate::error::WorkerError;
use crate::frame::{FrameError, build_frame};
use crate::history::HistoryBuffer;
use crate::model::{ModelDefinition, ObservableLayout};
use crate::operator::{ControlState, OperatorState};

/// Minimum spacing between two overrun warnings.
const OVERRUN_WARN_INTERVAL: Duration = Duration::from_secs(1);

/// Totals reported when the worker shuts down cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerSummary {
    /// Frames published over the worker's lifetime.
    pub frames: u64,
    /// Runs started (engine allocations).
    pub runs: u64,
}

/// Everything the worker task owns.
pub struct Worker {
    config: WorkerConfig,
    model: Arc<ModelDefinition>,
    layout: ObservableLayout,
    factory: Arc<dyn EngineFactory>,
    operator: Weak<OperatorState>,
    control: watch::Receiver<ControlState>,
    inbox: ParameterInbox,
    data: DataChannel,
    catalog: watch::Sender<Arc<ParameterCatalog>>,
    defaults: Arc<ParameterCatalog>,
    history: HistoryBuffer,
    engine: Option<Box<dyn SimulationEngine>>,
    run_id: RunId,
    iteration: u64,
    last_time: Option<f64>,
    overruns: OverrunLog,
    summary: WorkerSummary,
}

/// Channels wiring a worker to its controller.
pub struct WorkerChannels {
    /// Control state owner, used to record failures. The worker keeps
    /// only a weak reference so dropping every controller stops it.
    pub operator: Arc<OperatorState>,
    /// Control state observed by the worker.
    pub control: watch::Receiver<ControlState>,
    /// Incoming parameter updates.
    pub inbox: ParameterInbox,
    /// Outgoing bundles.
    pub data: DataChannel,
    /// Committed catalog snapshots.
    pub catalog: watch::Sender<Arc<ParameterCatalog>>,
}

enum Wake {
    Control,
    Parameter,
    Shutdown,
}

impl Worker {
    /// Assemble a worker. The current catalog value is taken as the
    /// default parameter set restored on every reset.
    pub fn new(
        config: WorkerConfig,
        model: Arc<ModelDefinition>,
        factory: Arc<dyn EngineFactory>,
        channels: WorkerChannels,
    ) -> Self {
        let layout = ObservableLayout::from_model(&model);
        let defaults = Arc::clone(&channels.catalog.borrow());
        let run_id = channels.control.borrow().run_id;
        let history = HistoryBuffer::new(config.history_capacity);
        Self {
            config,
            model,
            layout,
            factory,
            operator: Arc::downgrade(&channels.operator),
            control: channels.control,
            inbox: channels.inbox,
            data: channels.data,
            catalog: channels.catalog,
            defaults,
            history,
            engine: None,
            run_id,
            iteration: 0,
            last_time: None,
            overruns: OverrunLog::default(),
            summary: WorkerSummary::default(),
        }
    }

    /// Run until the controller goes away or the engine fails.
    ///
    /// A failure is recorded in the control state before returning, so
    /// `/health` reports it and further control actions are refused.
    pub async fn run(mut self) -> Result<WorkerSummary, WorkerError> {
        info!(
            model = %self.model.name,
            steps_per_frame = self.config.steps_per_frame,
            frame_rate_hz = self.config.frame_rate_hz,
            history_capacity = self.history.capacity(),
            "Simulation worker ready"
        );

        let result = self.run_loop().await;
        match &result {
            Ok(summary) => info!(
                frames = summary.frames,
                runs = summary.runs,
                "Simulation worker stopped"
            ),
            Err(e) => {
                error!(error = %e, run_id = %self.run_id, "Simulation worker failed");
                if let Some(operator) = self.operator.upgrade() {
                    operator.fail(e.to_string());
                }
            }
        }
        result
    }

    async fn run_loop(&mut self) -> Result<WorkerSummary, WorkerError> {
        let period = self.config.frame_period();
        let mut last_state = WorkerRunState::Stopped;

        loop {
            if self.control.has_changed().is_err() {
                return Ok(self.summary);
            }
            let state = self.control.borrow_and_update().clone();
            if state.run_id != self.run_id {
                self.begin_run(state.run_id)?;
            }
            if state.run_state != last_state {
                info!(
                    from = %last_state,
                    to = %state.run_state,
                    run_id = %state.run_id,
                    "Run state changed"
                );
                last_state = state.run_state;
            }

            if state.run_state == WorkerRunState::Running {
                let started = Instant::now();
                let deadline = started.checked_add(period).unwrap_or(started);

                self.iterate().await?;

                let now = Instant::now();
                if now > deadline {
                    self.overruns.record(now.saturating_duration_since(started), period);
                    continue;
                }
                tokio::select! {
                    () = tokio::time::sleep_until(deadline) => {}
                    changed = self.control.changed() => {
                        if changed.is_err() {
                            return Ok(self.summary);
                        }
                    }
                }
            } else {
                let wake = tokio::select! {
                    changed = self.control.changed() => {
                        if changed.is_ok() { Wake::Control } else { Wake::Shutdown }
                    }
                    open = self.inbox.ready() => {
                        if open { Wake::Parameter } else { Wake::Shutdown }
                    }
                };
                match wake {
                    Wake::Control => {}
                    Wake::Shutdown => return Ok(self.summary),
                    Wake::Parameter => self.commit_pending()?,
                }
            }
        }
    }

    /// Forget the previous run after a reset.
    ///
    /// Updates queued against the previous run are dropped. Updates
    /// already accepted for `run_id` are committed on top of the defaults.
    fn begin_run(&mut self, run_id: RunId) -> Result<(), WorkerError> {
        info!(
            previous = %self.run_id,
            run_id = %run_id,
            frames = self.iteration,
            history = self.history.len(),
            "Run reset"
        );
        self.engine = None;
        self.history.clear();
        self.iteration = 0;
        self.last_time = None;
        self.run_id = run_id;
        self.catalog.send_replace(Arc::clone(&self.defaults));
        self.commit_pending()
    }

    /// Commit whatever the inbox holds for the current run.
    fn commit_pending(&mut self) -> Result<(), WorkerError> {
        let batch = self
            .inbox
            .drain_batch(self.run_id, || self.control.borrow().run_id);
        if batch.superseded > 0 {
            info!(
                run_id = %self.run_id,
                dropped_updates = batch.superseded,
                "Dropped parameter updates of a reset run"
            );
        }
        if batch.values.is_empty() {
            return Ok(());
        }
        self.commit(&batch.values)
    }

    fn allocate(&mut self) -> Result<Box<dyn SimulationEngine>, EngineError> {
        let values = self.catalog.borrow().values();
        let engine = self.factory.allocate(&self.model, &values)?;
        self.summary.runs = self.summary.runs.saturating_add(1);
        info!(
            run_id = %self.run_id,
            sites = self.layout.site_count,
            parameters = values.len(),
            "Engine allocated"
        );
        Ok(engine)
    }

    /// One step batch, frame, publication and parameter commit.
    async fn iterate(&mut self) -> Result<(), WorkerError> {
        let engine = match self.engine.take() {
            Some(engine) => engine,
            None => self.allocate()?,
        };

        let steps = self.config.steps_per_frame;
        let (engine, outcome) = tokio::task::spawn_blocking(move || {
            let mut engine = engine;
            let outcome = engine.advance(steps).map(|()| engine.snapshot());
            (engine, outcome)
        })
        .await
        .map_err(|e| EngineError::Aborted(e.to_string()))?;
        let snapshot = outcome?;

        if self.control.borrow().run_id != self.run_id {
            debug!(run_id = %self.run_id, "Discarding step batch of superseded run");
            return Ok(());
        }
        self.engine = Some(engine);

        let frame = build_frame(&snapshot, &self.layout)?;
        if snapshot.config.len() != self.layout.site_count {
            return Err(FrameError::Shape {
                what: "config",
                expected: self.layout.site_count,
                actual: snapshot.config.len(),
            }
            .into());
        }
        if let Some(previous) = self.last_time.filter(|&previous| frame.time < previous) {
            return Err(WorkerError::TimeReversal {
                previous: previous.to_string(),
                current: frame.time.to_string(),
            });
        }

        self.last_time = Some(frame.time);
        self.iteration = self.iteration.saturating_add(1);
        self.summary.frames = self.summary.frames.saturating_add(1);
        self.history.append(frame.clone());

        trace!(
            run_id = %self.run_id,
            iteration = self.iteration,
            kmc_time = frame.time,
            "Frame published"
        );
        let bundle = DataBundle {
            run_id: self.run_id,
            iteration: self.iteration,
            frame,
            history: self.history.snapshot(),
            config: snapshot.config,
        };
        if !self.data.publish(bundle) {
            debug!(run_id = %self.run_id, "Data channel rejected bundle of superseded run");
        }

        self.commit_pending()
    }

    /// Validate a batch against the current catalog and push the result
    /// into the engine as one update.
    fn commit(&mut self, batch: &BTreeMap<String, f64>) -> Result<(), WorkerError> {
        let current = Arc::clone(&self.catalog.borrow());
        let (next, rejected) = current.with_updates(batch);
        for e in &rejected {
            warn!(error = %e, "Dropped parameter update");
        }
        if next == *current {
            return Ok(());
        }

        if let Some(engine) = self.engine.as_mut() {
            engine.apply_parameters(&next.values())?;
        }
        debug!(
            run_id = %self.run_id,
            applied = batch.len().saturating_sub(rejected.len()),
            engine_allocated = self.engine.is_some(),
            "Committed parameter batch"
        );
        self.catalog.send_replace(Arc::new(next));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Overrun logging
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct OverrunLog {
    last_warned: Option<Instant>,
    suppressed: u64,
}

impl OverrunLog {
    fn record(&mut self, elapsed: Duration, period: Duration) {
        let now = Instant::now();
        let due = self
            .last_warned
            .is_none_or(|at| now.saturating_duration_since(at) >= OVERRUN_WARN_INTERVAL);
        if due {
            warn!(
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
                suppressed = self.suppressed,
                "Step batch overran frame period"
            );
            self.last_warned = Some(now);
            self.suppressed = 0;
        } else {
            self.suppressed = self.suppressed.saturating_add(1);
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::cast_precision_loss,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::sync::Mutex;

    use catalyst_types::ControlAction;

    use super::*;
    use crate::channel::{DataSlot, parameter_channel};
    use crate::engine::EngineSnapshot;

    /// Engine whose time advances by `1e-6 * steps` per batch.
    struct CountingEngine {
        layout: ObservableLayout,
        time: f64,
        batches: u64,
        log: Arc<Mutex<EngineLog>>,
        fail_after: Option<u64>,
    }

    #[derive(Debug, Default)]
    struct EngineLog {
        allocations: u64,
        applied: Vec<BTreeMap<String, f64>>,
    }

    impl SimulationEngine for CountingEngine {
        fn advance(&mut self, steps: u64) -> Result<(), EngineError> {
            if self.fail_after.is_some_and(|n| self.batches >= n) {
                return Err(EngineError::Step(String::from("scripted failure")));
            }
            self.batches += 1;
            self.time += steps as f64 * 1e-6;
            Ok(())
        }

        fn snapshot(&self) -> EngineSnapshot {
            let species = self.layout.species.len();
            let sites = self.layout.sites.len();
            EngineSnapshot {
                time: self.time,
                occupation: vec![vec![0.5; sites]; species],
                tof_instant: vec![f64::NAN; self.layout.tof_channels.len()],
                tof_integrated: vec![self.batches as f64; self.layout.tof_channels.len()],
                config: vec![-1; self.layout.site_count],
            }
        }

        fn apply_parameters(&mut self, values: &BTreeMap<String, f64>) -> Result<(), EngineError> {
            self.log.lock().unwrap().applied.push(values.clone());
            Ok(())
        }
    }

    struct CountingFactory {
        log: Arc<Mutex<EngineLog>>,
        fail_after: Option<u64>,
    }

    impl EngineFactory for CountingFactory {
        fn allocate(
            &self,
            model: &ModelDefinition,
            _parameters: &BTreeMap<String, f64>,
        ) -> Result<Box<dyn SimulationEngine>, EngineError> {
            self.log.lock().unwrap().allocations += 1;
            Ok(Box::new(CountingEngine {
                layout: ObservableLayout::from_model(model),
                time: 0.0,
                batches: 0,
                log: Arc::clone(&self.log),
                fail_after: self.fail_after,
            }))
        }
    }

    struct Harness {
        operator: Arc<OperatorState>,
        parameters: crate::channel::ParameterChannel,
        data: DataChannel,
        catalog: watch::Receiver<Arc<ParameterCatalog>>,
        log: Arc<Mutex<EngineLog>>,
        handle: tokio::task::JoinHandle<Result<WorkerSummary, WorkerError>>,
    }

    impl Harness {
        /// Queue an update against the current run, as the controller does.
        fn submit(&self, label: &str, value: f64) {
            let run_id = self.operator.current().run_id;
            self.parameters
                .submit(run_id, catalyst_types::ParameterUpdate::new(label, value))
                .unwrap();
        }
    }

    fn spawn_worker(fail_after: Option<u64>) -> Harness {
        let mut model = ModelDefinition::methanation();
        model.size = crate::model::LatticeSize { x: 2, y: 2 };
        let model = Arc::new(model);
        let config = WorkerConfig {
            steps_per_frame: 1000,
            frame_rate_hz: 500.0,
            history_capacity: 5,
            parameter_channel_capacity: 10,
            seed: None,
        };
        let (operator, control) = OperatorState::new();
        let operator = Arc::new(operator);
        let (parameters, inbox) = parameter_channel(config.parameter_channel_capacity);
        let data = DataChannel::new(control.borrow().run_id);
        let (catalog_tx, catalog) = watch::channel(Arc::new(ParameterCatalog::from_model(&model)));
        let log = Arc::new(Mutex::new(EngineLog::default()));
        let factory = Arc::new(CountingFactory {
            log: Arc::clone(&log),
            fail_after,
        });
        let worker = Worker::new(
            config,
            model,
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
        Harness {
            operator,
            parameters,
            data,
            catalog,
            log,
            handle,
        }
    }

    async fn wait_for_iteration(data: &DataChannel, iteration: u64) -> Arc<DataBundle> {
        let mut rx = data.subscribe();
        let slot = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|slot: &DataSlot| {
                slot.bundle
                    .as_ref()
                    .is_some_and(|b| b.iteration >= iteration)
            }),
        )
        .await
        .unwrap()
        .unwrap();
        Arc::clone(slot.bundle.as_ref().unwrap())
    }

    #[tokio::test]
    async fn publishes_frames_in_time_order() {
        let h = spawn_worker(None);
        h.operator.apply(ControlAction::Start).unwrap();

        let bundle = wait_for_iteration(&h.data, 8).await;
        assert_eq!(bundle.history.len(), 5);
        let times: Vec<f64> = bundle.history.iter().map(|f| f.time).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert!((bundle.frame.time - times[4]).abs() < f64::EPSILON);
        assert!(bundle.frame.tof_values.iter().all(|t| t.instant.abs() < f64::EPSILON));
        assert_eq!(bundle.config.len(), 2 * 2 * 3);
        assert_eq!(h.log.lock().unwrap().allocations, 1);
    }

    #[tokio::test]
    async fn pause_keeps_last_completed_batch() {
        let h = spawn_worker(None);
        h.operator.apply(ControlAction::Start).unwrap();
        wait_for_iteration(&h.data, 2).await;
        h.operator.apply(ControlAction::Pause).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let paused = h.data.peek().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let later = h.data.peek().unwrap();
        assert_eq!(paused.iteration, later.iteration);
        let expected = paused.iteration as f64 * 1000.0 * 1e-6;
        assert!((later.frame.time - expected).abs() < 1e-9);

        h.operator.apply(ControlAction::Resume).unwrap();
        let resumed = wait_for_iteration(&h.data, later.iteration + 1).await;
        assert!(resumed.frame.time > later.frame.time);
        assert_eq!(h.log.lock().unwrap().allocations, 1);
    }

    #[tokio::test]
    async fn parameter_batch_applies_last_value_per_label() {
        let h = spawn_worker(None);
        h.operator.apply(ControlAction::Start).unwrap();
        h.operator.apply(ControlAction::Pause).unwrap();

        let mut catalog = h.catalog.clone();
        h.submit("T", 600.0);
        h.submit("T", 650.0);
        h.submit("E_C", 2.0);

        let committed = tokio::time::timeout(
            Duration::from_secs(5),
            catalog.wait_for(|c| {
                c.get("T").is_some_and(|s| (s.value - 650.0).abs() < 1e-9)
                    && c.get("E_C").is_some_and(|s| (s.value - 2.0).abs() < 1e-9)
            }),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert!(committed.specs().values().all(|s| s.value >= s.min && s.value <= s.max));
    }

    #[tokio::test]
    async fn running_commit_reaches_engine() {
        let h = spawn_worker(None);
        h.operator.apply(ControlAction::Start).unwrap();
        wait_for_iteration(&h.data, 1).await;
        h.submit("p_COgas", 1.0);

        let mut catalog = h.catalog.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            catalog.wait_for(|c| c.get("p_COgas").is_some_and(|s| (s.value - 1.0).abs() < 1e-12)),
        )
        .await
        .unwrap()
        .unwrap();
        let log = h.log.lock().unwrap();
        let last = log.applied.last().unwrap();
        assert!((last["p_COgas"] - 1.0).abs() < 1e-12);
        assert!((last["T"] - 523.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn out_of_range_update_is_dropped_inside_worker() {
        let h = spawn_worker(None);
        h.submit("T", 9999.0);
        h.submit("E_O", 0.0);

        let mut catalog = h.catalog.clone();
        let committed = tokio::time::timeout(
            Duration::from_secs(5),
            catalog.wait_for(|c| c.get("E_O").is_some_and(|s| s.value.abs() < 1e-12)),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert!(committed.get("T").is_some_and(|s| (s.value - 523.0).abs() < 1e-9));
    }

    #[tokio::test]
    async fn reset_clears_history_and_restarts_time() {
        let h = spawn_worker(None);
        h.operator.apply(ControlAction::Start).unwrap();
        let before = wait_for_iteration(&h.data, 10).await;

        let next = RunId::new();
        h.data.drain(next);
        h.operator.reset(next).unwrap();
        assert!(h.data.peek().is_none());

        h.operator.apply(ControlAction::Start).unwrap();
        let after = wait_for_iteration(&h.data, 1).await;
        assert_eq!(after.run_id, next);
        assert_ne!(after.run_id, before.run_id);
        let expected = after.iteration as f64 * 1000.0 * 1e-6;
        assert!((after.frame.time - expected).abs() < 1e-9);
        assert_eq!(after.history.len() as u64, after.iteration.min(5));
        assert_eq!(h.log.lock().unwrap().allocations, 2);
    }

    #[tokio::test]
    async fn reset_drops_only_updates_of_the_previous_run() {
        // Nothing below yields, so the worker sees the reset and both
        // updates together at its first boundary.
        let h = spawn_worker(None);
        h.submit("T", 600.0);
        let next = RunId::new();
        h.operator.reset(next).unwrap();
        h.submit("E_C", 2.0);

        let mut catalog = h.catalog.clone();
        let committed = tokio::time::timeout(
            Duration::from_secs(5),
            catalog.wait_for(|c| c.get("E_C").is_some_and(|s| (s.value - 2.0).abs() < 1e-9)),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert!(committed.get("T").is_some_and(|s| (s.value - 523.0).abs() < 1e-9));
    }

    #[tokio::test]
    async fn engine_failure_is_fatal_and_recorded() {
        let h = spawn_worker(Some(2));
        h.operator.apply(ControlAction::Start).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), h.handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(WorkerError::Engine(EngineError::Step(_)))));
        let state = h.operator.current();
        assert_eq!(state.run_state, WorkerRunState::Stopped);
        assert!(state.failure.is_some());
        assert!(h.operator.apply(ControlAction::Start).is_err());
    }

    #[tokio::test]
    async fn worker_exits_when_controller_drops() {
        let h = spawn_worker(None);
        let Harness {
            operator,
            parameters,
            handle,
            ..
        } = h;
        drop(parameters);
        drop(operator);
        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(summary.frames, 0);
    }
}
