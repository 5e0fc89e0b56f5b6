//! Run control state shared between the controller and the worker.
//!
//! The controller validates and applies start/pause/resume/reset
//! transitions here. The worker observes them through a
//! [`watch::Receiver`] and acts on them at its next iteration boundary,
//! so a pause never interrupts a step batch or a parameter commit.
//!
//! # Atomicity
//!
//! Every transition is checked and applied inside
//! [`watch::Sender::send_if_modified`], which holds the channel's write
//! lock for the duration of the closure. Two concurrent `start` requests
//! therefore cannot both succeed.

use catalyst_types::{ControlAction, HealthReport, RunId, WorkerRunState};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::ControlError;

/// Snapshot of the run control state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    /// Current run state.
    pub run_state: WorkerRunState,
    /// Identifier of the current run. Replaced on every reset.
    pub run_id: RunId,
    /// Failure reason recorded by a worker that terminated abnormally.
    pub failure: Option<String>,
    /// When the current run was started.
    pub started_at: Option<DateTime<Utc>>,
}

impl ControlState {
    fn initial() -> Self {
        Self {
            run_state: WorkerRunState::Stopped,
            run_id: RunId::new(),
            failure: None,
            started_at: None,
        }
    }

    /// Health report for `GET /health`.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            has_started: self.run_state.has_started(),
            is_paused: self.run_state.is_paused(),
            state: self.run_state,
            run_id: self.run_id,
            failure: self.failure.clone(),
            started_at: self.started_at.map(|t| t.to_rfc3339()),
        }
    }

    /// Compute the state reached by `action`, without applying it.
    ///
    /// `next_run_id` is only used by [`ControlAction::Reset`].
    pub fn transition(
        &self,
        action: ControlAction,
        next_run_id: RunId,
    ) -> Result<Self, ControlError> {
        use WorkerRunState::{Paused, Running, Stopped};

        if let Some(reason) = &self.failure {
            return Err(ControlError::WorkerUnavailable {
                reason: reason.clone(),
            });
        }

        let from = self.run_state;
        let run_state = match (action, from) {
            (ControlAction::Start, Stopped) | (ControlAction::Resume, Paused) => Running,
            (ControlAction::Pause, Running) => Paused,
            (ControlAction::Reset, _) => {
                return Ok(Self {
                    run_state: Stopped,
                    run_id: next_run_id,
                    failure: None,
                    started_at: None,
                });
            }
            (ControlAction::Start | ControlAction::Resume, Running)
            | (ControlAction::Pause, Paused) => {
                return Err(ControlError::AlreadyInState {
                    action,
                    state: from,
                });
            }
            (ControlAction::Start, Paused)
            | (ControlAction::Pause | ControlAction::Resume, Stopped) => {
                return Err(ControlError::InvalidTransition { action, from });
            }
        };

        let started_at = if action == ControlAction::Start {
            Some(Utc::now())
        } else {
            self.started_at
        };

        Ok(Self {
            run_state,
            run_id: self.run_id,
            failure: None,
            started_at,
        })
    }
}

/// Owner of the control-state channel.
#[derive(Debug)]
pub struct OperatorState {
    tx: watch::Sender<ControlState>,
}

impl OperatorState {
    /// Create the state in `Stopped` with a fresh run id.
    ///
    /// Returns the receiver the worker observes.
    pub fn new() -> (Self, watch::Receiver<ControlState>) {
        let (tx, rx) = watch::channel(ControlState::initial());
        (Self { tx }, rx)
    }

    /// Copy of the current state.
    pub fn current(&self) -> ControlState {
        self.tx.borrow().clone()
    }

    /// Identifier of the current run.
    pub fn run_id(&self) -> RunId {
        self.tx.borrow().run_id
    }

    /// Apply a start, pause, or resume action.
    ///
    /// [`ControlAction::Reset`] is forwarded to [`reset`](Self::reset) with
    /// a freshly generated run id.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::AlreadyInState`] or
    /// [`ControlError::InvalidTransition`] if the action does not apply,
    /// and [`ControlError::WorkerUnavailable`] if the worker has gone.
    pub fn apply(&self, action: ControlAction) -> Result<ControlState, ControlError> {
        self.apply_with(action, RunId::new())
    }

    /// Reset to `Stopped` under `run_id`.
    pub fn reset(&self, run_id: RunId) -> Result<ControlState, ControlError> {
        self.apply_with(ControlAction::Reset, run_id)
    }

    fn apply_with(
        &self,
        action: ControlAction,
        next_run_id: RunId,
    ) -> Result<ControlState, ControlError> {
        if self.tx.is_closed() {
            let reason = self
                .tx
                .borrow()
                .failure
                .clone()
                .unwrap_or_else(|| String::from("worker has exited"));
            return Err(ControlError::WorkerUnavailable { reason });
        }

        let mut outcome = Err(ControlError::WorkerUnavailable {
            reason: String::from("transition not evaluated"),
        });
        self.tx.send_if_modified(|state| {
            match state.transition(action, next_run_id) {
                Ok(next) => {
                    *state = next.clone();
                    outcome = Ok(next);
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome
    }

    /// Record a fatal worker failure. The state becomes `Stopped` and
    /// every later action fails with [`ControlError::WorkerUnavailable`].
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_modify(|state| {
            state.run_state = WorkerRunState::Stopped;
            state.failure = Some(reason);
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn start_pause_resume_cycle() {
        let (op, _rx) = OperatorState::new();
        assert_eq!(op.current().run_state, WorkerRunState::Stopped);

        let started = op.apply(ControlAction::Start).unwrap();
        assert_eq!(started.run_state, WorkerRunState::Running);
        assert!(started.started_at.is_some());

        assert_eq!(op.apply(ControlAction::Pause).unwrap().run_state, WorkerRunState::Paused);
        let resumed = op.apply(ControlAction::Resume).unwrap();
        assert_eq!(resumed.run_state, WorkerRunState::Running);
        assert_eq!(resumed.started_at, started.started_at);
        assert_eq!(resumed.run_id, started.run_id);
    }

    #[test]
    fn repeated_actions_report_already_in_state() {
        let (op, _rx) = OperatorState::new();
        op.apply(ControlAction::Start).unwrap();
        assert_eq!(
            op.apply(ControlAction::Start),
            Err(ControlError::AlreadyInState {
                action: ControlAction::Start,
                state: WorkerRunState::Running,
            })
        );
        op.apply(ControlAction::Pause).unwrap();
        assert!(matches!(
            op.apply(ControlAction::Pause),
            Err(ControlError::AlreadyInState { .. })
        ));
    }

    #[test]
    fn disallowed_transitions_leave_state_unchanged() {
        let (op, _rx) = OperatorState::new();
        let before = op.current();
        assert_eq!(
            op.apply(ControlAction::Pause),
            Err(ControlError::InvalidTransition {
                action: ControlAction::Pause,
                from: WorkerRunState::Stopped,
            })
        );
        assert!(matches!(
            op.apply(ControlAction::Resume),
            Err(ControlError::InvalidTransition { .. })
        ));
        assert_eq!(op.current(), before);

        op.apply(ControlAction::Start).unwrap();
        op.apply(ControlAction::Pause).unwrap();
        assert!(matches!(
            op.apply(ControlAction::Start),
            Err(ControlError::InvalidTransition {
                from: WorkerRunState::Paused,
                ..
            })
        ));
    }

    #[test]
    fn reset_issues_new_run_id() {
        let (op, _rx) = OperatorState::new();
        let first = op.apply(ControlAction::Start).unwrap().run_id;
        let next = RunId::new();
        let state = op.reset(next).unwrap();
        assert_eq!(state.run_state, WorkerRunState::Stopped);
        assert_eq!(state.run_id, next);
        assert_ne!(state.run_id, first);
        assert!(state.started_at.is_none());
    }

    #[test]
    fn reset_from_paused_stops_run() {
        let (op, _rx) = OperatorState::new();
        let first = op.apply(ControlAction::Start).unwrap().run_id;
        op.apply(ControlAction::Pause).unwrap();

        let state = op.reset(RunId::new()).unwrap();
        assert_eq!(state.run_state, WorkerRunState::Stopped);
        assert!(!state.health().is_paused);
        assert_ne!(op.run_id(), first);
        assert_eq!(op.apply(ControlAction::Start).unwrap().run_id, state.run_id);
    }

    #[test]
    fn failure_blocks_further_actions() {
        let (op, _rx) = OperatorState::new();
        op.apply(ControlAction::Start).unwrap();
        op.fail("engine exploded");
        let health = op.current().health();
        assert!(!health.has_started);
        assert_eq!(health.failure.as_deref(), Some("engine exploded"));
        assert_eq!(
            op.apply(ControlAction::Reset),
            Err(ControlError::WorkerUnavailable {
                reason: String::from("engine exploded"),
            })
        );
    }

    #[test]
    fn closed_receiver_means_worker_gone() {
        let (op, rx) = OperatorState::new();
        drop(rx);
        assert!(matches!(
            op.apply(ControlAction::Start),
            Err(ControlError::WorkerUnavailable { .. })
        ));
    }

    #[test]
    fn concurrent_starts_succeed_once() {
        let (op, _rx) = OperatorState::new();
        let op = Arc::new(op);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let op = Arc::clone(&op);
                std::thread::spawn(move || op.apply(ControlAction::Start).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn receiver_observes_transitions() {
        let (op, mut rx) = OperatorState::new();
        op.apply(ControlAction::Start).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().run_state, WorkerRunState::Running);
    }
}
