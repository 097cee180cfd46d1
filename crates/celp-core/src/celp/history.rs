//! Rolling sample history
//!
//! Fixed-length history of the most recent samples (speech, weighted
//! speech or excitation). New frames are appended at the back and the
//! oldest samples fall off the front.

use std::collections::VecDeque;

/// Fixed-length FIFO of the most recent samples
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl RollingBuffer {
    /// Create a zero-filled history of `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: std::iter::repeat(0.0).take(capacity).collect(),
            capacity,
        }
    }

    /// Number of samples held (always the capacity)
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True for a zero-capacity history
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a frame, dropping the oldest samples
    pub fn append(&mut self, frame: &[f32]) {
        let frame = &frame[frame.len().saturating_sub(self.capacity)..];
        self.samples.drain(..frame.len());
        self.samples.extend(frame.iter().copied());
    }

    /// Window view: copy the newest `out.len()` samples into `out`
    pub fn copy_tail(&self, out: &mut [f32]) {
        let start = self.samples.len() - out.len().min(self.samples.len());
        for (dst, src) in out.iter_mut().zip(self.samples.range(start..)) {
            *dst = *src;
        }
    }

    /// Zero the history
    pub fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
    }
}
