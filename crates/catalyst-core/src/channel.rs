//! Channels between the control surface and the worker.
//!
//! - [`ParameterChannel`] / [`ParameterInbox`]: bounded, non-blocking
//!   queue of parameter updates flowing into the worker.
//! - [`DataChannel`]: single overwrite-on-publish slot carrying the latest
//!   [`DataBundle`] out of the worker.

use std::collections::BTreeMap;
use std::sync::Arc;

use catalyst_types::{DataBundle, ParameterUpdate, RunId};
use tokio::sync::{mpsc, watch};

use crate::error::ControlError;

// ---------------------------------------------------------------------------
// Parameter channel
// ---------------------------------------------------------------------------

/// Sending half of the parameter queue, held by the controller.
#[derive(Debug, Clone)]
pub struct ParameterChannel {
    tx: mpsc::Sender<QueuedUpdate>,
    capacity: usize,
}

/// A parameter update tagged with the run that was current when it was
/// accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedUpdate {
    /// Run the update was submitted against.
    pub run_id: RunId,
    /// The update itself.
    pub update: ParameterUpdate,
}

/// Receiving half of the parameter queue, owned by the worker.
///
/// Updates tagged with a run the worker has not reached yet are held back
/// until [`ParameterInbox::drain_batch`] is called for that run.
#[derive(Debug)]
pub struct ParameterInbox {
    rx: mpsc::Receiver<QueuedUpdate>,
    held: Vec<QueuedUpdate>,
}

/// Updates taken from the inbox for one commit.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DrainedBatch {
    /// Most recent value per label.
    pub values: BTreeMap<String, f64>,
    /// Updates discarded because their run was reset before the worker
    /// got to them.
    pub superseded: usize,
}

/// Create a parameter queue holding at most `capacity` pending updates.
pub fn parameter_channel(capacity: usize) -> (ParameterChannel, ParameterInbox) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let inbox = ParameterInbox {
        rx,
        held: Vec::new(),
    };
    (ParameterChannel { tx, capacity }, inbox)
}

impl ParameterChannel {
    /// Enqueue an already validated update for `run_id` without waiting.
    ///
    /// # Errors
    ///
    /// [`ControlError::Backpressure`] when the queue is full,
    /// [`ControlError::WorkerUnavailable`] when the worker is gone.
    pub fn submit(&self, run_id: RunId, update: ParameterUpdate) -> Result<(), ControlError> {
        self.tx
            .try_send(QueuedUpdate { run_id, update })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ControlError::Backpressure {
                    capacity: self.capacity,
                },
                mpsc::error::TrySendError::Closed(_) => ControlError::WorkerUnavailable {
                    reason: String::from("parameter channel closed"),
                },
            })
    }

    /// Whether the worker has dropped its inbox.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl ParameterInbox {
    /// Take every pending update of `run_id`, keeping the most recent value
    /// per label.
    ///
    /// `latest` is the newest run id published by the controller, read
    /// after the queue was emptied. Updates tagged with any other run are
    /// superseded and dropped. Updates tagged `latest` while the worker is
    /// still on an older `run_id` are held for the next call.
    pub fn drain_batch(&mut self, run_id: RunId, latest: impl FnOnce() -> RunId) -> DrainedBatch {
        while let Ok(queued) = self.rx.try_recv() {
            self.held.push(queued);
        }
        if self.held.is_empty() {
            return DrainedBatch::default();
        }

        let latest = latest();
        let before = self.held.len();
        self.held.retain(|queued| queued.run_id == latest);
        let mut batch = DrainedBatch {
            superseded: before.saturating_sub(self.held.len()),
            ..DrainedBatch::default()
        };
        if run_id == latest {
            for queued in self.held.drain(..) {
                batch.values.insert(queued.update.label, queued.update.value);
            }
        }
        batch
    }

    /// Wait until the queue has something to drain. Returns `false` once
    /// every sender is gone.
    pub async fn ready(&mut self) -> bool {
        match self.rx.recv().await {
            Some(queued) => {
                self.held.push(queued);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Data channel
// ---------------------------------------------------------------------------

/// Contents of the data slot.
#[derive(Debug, Clone, Default)]
pub struct DataSlot {
    /// Run whose bundles are accepted.
    pub run_id: RunId,
    /// Latest bundle of that run, if any.
    pub bundle: Option<Arc<DataBundle>>,
    /// Whether `bundle` has been consumed already.
    pub taken: bool,
}

/// A bundle handed to a reader.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The bundle.
    pub bundle: Arc<DataBundle>,
    /// `true` if no reader had consumed this bundle before.
    pub fresh: bool,
}

/// Overwrite-on-publish slot for the latest bundle.
///
/// Publishing never blocks and never fails: an unread bundle is simply
/// replaced. Bundles carrying a run id other than the slot's current one
/// are discarded.
#[derive(Debug, Clone)]
pub struct DataChannel {
    tx: Arc<watch::Sender<DataSlot>>,
}

impl DataChannel {
    /// Create an empty slot accepting bundles of `run_id`.
    pub fn new(run_id: RunId) -> Self {
        let (tx, _rx) = watch::channel(DataSlot {
            run_id,
            ..DataSlot::default()
        });
        Self { tx: Arc::new(tx) }
    }

    /// Publish a bundle. Returns `false` if it belonged to a superseded run.
    pub fn publish(&self, bundle: DataBundle) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.run_id != bundle.run_id {
                return false;
            }
            slot.bundle = Some(Arc::new(bundle));
            slot.taken = false;
            true
        })
    }

    /// Return the latest bundle and mark it consumed.
    pub fn consume(&self) -> Option<Delivery> {
        let mut delivery = None;
        self.tx.send_if_modified(|slot| {
            if let Some(bundle) = &slot.bundle {
                delivery = Some(Delivery {
                    bundle: Arc::clone(bundle),
                    fresh: !slot.taken,
                });
                slot.taken = true;
            }
            false
        });
        delivery
    }

    /// Return the latest bundle without marking it consumed.
    pub fn peek(&self) -> Option<Arc<DataBundle>> {
        self.tx.borrow().bundle.clone()
    }

    /// Empty the slot and accept only bundles of `run_id` from now on.
    pub fn drain(&self, run_id: RunId) {
        self.tx.send_modify(|slot| {
            *slot = DataSlot {
                run_id,
                ..DataSlot::default()
            };
        });
    }

    /// Observe publications.
    pub fn subscribe(&self) -> watch::Receiver<DataSlot> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use catalyst_types::Frame;

    use super::*;

    fn bundle(run_id: RunId, time: f64) -> DataBundle {
        let frame = Frame {
            time,
            ..Frame::default()
        };
        DataBundle {
            run_id,
            iteration: 1,
            frame: frame.clone(),
            history: vec![frame],
            config: Vec::new(),
        }
    }

    #[test]
    fn submit_until_full_then_backpressure() {
        let run = RunId::new();
        let (channel, _inbox) = parameter_channel(2);
        assert!(channel.submit(run, ParameterUpdate::new("T", 500.0)).is_ok());
        assert!(channel.submit(run, ParameterUpdate::new("T", 510.0)).is_ok());
        let err = channel.submit(run, ParameterUpdate::new("T", 520.0)).unwrap_err();
        assert_eq!(err, ControlError::Backpressure { capacity: 2 });
        assert!(err.is_retryable());
    }

    #[test]
    fn submit_to_closed_inbox_fails() {
        let (channel, inbox) = parameter_channel(4);
        drop(inbox);
        assert!(matches!(
            channel.submit(RunId::new(), ParameterUpdate::new("T", 500.0)),
            Err(ControlError::WorkerUnavailable { .. })
        ));
    }

    #[test]
    fn drain_batch_keeps_last_value_per_label() {
        let run = RunId::new();
        let (channel, mut inbox) = parameter_channel(10);
        channel.submit(run, ParameterUpdate::new("T", 500.0)).unwrap();
        channel.submit(run, ParameterUpdate::new("p_COgas", 1.0)).unwrap();
        channel.submit(run, ParameterUpdate::new("T", 600.0)).unwrap();

        let batch = inbox.drain_batch(run, || run);
        assert_eq!(batch.values.len(), 2);
        assert_eq!(batch.superseded, 0);
        assert!((batch.values["T"] - 600.0).abs() < f64::EPSILON);
        assert!(inbox.drain_batch(run, || run).values.is_empty());
        assert!(channel.submit(run, ParameterUpdate::new("T", 700.0)).is_ok());
    }

    #[test]
    fn drain_batch_drops_superseded_and_holds_next_run() {
        let old = RunId::new();
        let new = RunId::new();
        let (channel, mut inbox) = parameter_channel(10);
        channel.submit(old, ParameterUpdate::new("T", 500.0)).unwrap();
        channel.submit(new, ParameterUpdate::new("T", 650.0)).unwrap();

        // Worker still on the old run: old entry is stale, new one waits.
        let batch = inbox.drain_batch(old, || new);
        assert!(batch.values.is_empty());
        assert_eq!(batch.superseded, 1);

        let batch = inbox.drain_batch(new, || new);
        assert_eq!(batch.superseded, 0);
        assert!((batch.values["T"] - 650.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn ready_reports_closed_queue() {
        let run = RunId::new();
        let (channel, mut inbox) = parameter_channel(2);
        channel.submit(run, ParameterUpdate::new("T", 500.0)).unwrap();
        assert!(inbox.ready().await);
        assert_eq!(inbox.drain_batch(run, || run).values.len(), 1);

        drop(channel);
        assert!(!inbox.ready().await);
    }

    #[test]
    fn publish_overwrites_unread_bundle() {
        let run = RunId::new();
        let data = DataChannel::new(run);
        assert!(data.publish(bundle(run, 1.0)));
        assert!(data.publish(bundle(run, 2.0)));

        let first = data.consume().unwrap();
        assert!(first.fresh);
        assert!((first.bundle.frame.time - 2.0).abs() < f64::EPSILON);

        let again = data.consume().unwrap();
        assert!(!again.fresh);
        assert!((again.bundle.frame.time - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stale_run_is_discarded_after_drain() {
        let old = RunId::new();
        let data = DataChannel::new(old);
        data.publish(bundle(old, 1.0));

        let new = RunId::new();
        data.drain(new);
        assert!(data.consume().is_none());
        assert!(!data.publish(bundle(old, 3.0)));
        assert!(data.peek().is_none());
        assert!(data.publish(bundle(new, 0.0)));
        assert!(data.peek().is_some());
    }

    #[tokio::test]
    async fn subscribers_see_publications() {
        let run = RunId::new();
        let data = DataChannel::new(run);
        let mut rx = data.subscribe();
        data.publish(bundle(run, 1.0));
        let slot = rx.wait_for(|slot| slot.bundle.is_some()).await.unwrap();
        assert_eq!(slot.run_id, run);
    }
}
