//! Bounded per-user position history with timestamp lookup

use shared::PositionSample;
use std::collections::VecDeque;

/// Time-ordered history of a user's most recent position samples.
///
/// Holds at most `max_history` samples; recording past capacity evicts the
/// oldest one. Samples stay sorted by `captured_at` even when a client
/// delivers a late reading.
#[derive(Debug, Clone)]
pub struct PositionTrack {
    samples: VecDeque<PositionSample>,
    max_history: usize,
}

impl PositionTrack {
    /// Creates an empty track. A capacity of zero is treated as one.
    pub fn new(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            samples: VecDeque::with_capacity(max_history + 1),
            max_history,
        }
    }

    /// Records a sample, evicting the oldest one when over capacity
    pub fn record(&mut self, sample: PositionSample) {
        match self.samples.back() {
            Some(last) if sample.captured_at < last.captured_at => {
                let index = self
                    .samples
                    .partition_point(|s| s.captured_at <= sample.captured_at);
                self.samples.insert(index, sample);
            }
            _ => self.samples.push_back(sample),
        }

        while self.samples.len() > self.max_history {
            self.samples.pop_front();
        }
    }

    pub fn latest(&self) -> Option<PositionSample> {
        self.samples.back().copied()
    }

    pub fn earliest(&self) -> Option<PositionSample> {
        self.samples.front().copied()
    }

    /// Estimates where the user was at `timestamp`.
    ///
    /// Timestamps outside the recorded window clamp to the first or last
    /// sample. Inside the window, latitude, longitude and accuracy are
    /// linearly interpolated between the two bracketing samples and the
    /// result is stamped with `timestamp`.
    pub fn at(&self, timestamp: u64) -> Option<PositionSample> {
        let first = self.samples.front()?;
        let last = self.samples.back()?;

        if timestamp <= first.captured_at {
            return Some(*first);
        }
        if timestamp >= last.captured_at {
            return Some(*last);
        }

        // first.captured_at < timestamp < last.captured_at, so 0 < index < len
        let index = self
            .samples
            .partition_point(|s| s.captured_at < timestamp);
        let next = self.samples[index];
        if next.captured_at == timestamp {
            return Some(next);
        }
        let prev = self.samples[index - 1];

        let factor = (timestamp - prev.captured_at) as f64
            / (next.captured_at - prev.captured_at) as f64;
        let lerp = |a: f64, b: f64| a + factor * (b - a);

        Some(PositionSample {
            latitude: lerp(prev.latitude, next.latitude),
            longitude: lerp(prev.longitude, next.longitude),
            accuracy: lerp(prev.accuracy, next.accuracy),
            captured_at: timestamp,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionSample> {
        self.samples.iter()
    }
}
