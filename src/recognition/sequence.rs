//! Bounded window of encoded frames fed to the sequence classifier.

use std::collections::VecDeque;

use super::features::FeatureVector;

/// Default window length: 30 frames, about one second at 30 fps.
pub const DEFAULT_SEQUENCE_LENGTH: usize = 30;

/// Rolling window that keeps the most recent `capacity` frames in
/// chronological order. Length never exceeds capacity.
#[derive(Debug, Clone)]
pub struct SequenceWindow {
    frames: VecDeque<FeatureVector>,
    capacity: usize,
}

impl SequenceWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest once full.
    pub fn push(&mut self, frame: FeatureVector) {
        while self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the window holds exactly `capacity` frames.
    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }

    /// Change capacity, dropping the oldest frames if shrinking.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    /// Empty the window.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Copy of the frames, oldest first.
    pub fn snapshot(&self) -> Vec<FeatureVector> {
        self.frames.iter().cloned().collect()
    }

    /// Frames flattened into one row-major buffer, oldest first.
    pub fn as_flat(&self) -> Vec<f32> {
        let width = self.frames.front().map(|f| f.len()).unwrap_or(0);
        let mut out = Vec::with_capacity(self.frames.len() * width);
        for frame in &self.frames {
            out.extend_from_slice(frame.as_slice());
        }
        out
    }
}

impl Default for SequenceWindow {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_LENGTH)
    }
}
