//! Fixed-capacity rolling window of recent frames.

use std::collections::VecDeque;

use catalyst_types::Frame;

/// Holds the last `capacity` frames of the current run, oldest first.
///
/// Owned by the worker. Readers receive copies through
/// [`snapshot`](Self::snapshot) inside each published bundle.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest one when full.
    pub fn append(&mut self, frame: Frame) {
        while self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Copy of the window, oldest first.
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.iter().cloned().collect()
    }

    /// Drop every frame. Called when a run is reset.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Number of frames held.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Maximum number of frames held.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
