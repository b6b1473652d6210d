//! Whole-update timing for the runtime loop

use crate::ring_buffer::RingBuffer;
use std::time::{Duration, Instant};

/// Rolling statistics over the last `capacity` world updates.
pub struct FrameTimer {
    samples: RingBuffer<Duration>,
    frames: u64,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: RingBuffer::new(capacity),
            frames: 0,
        }
    }

    /// Run `update` and record how long it took.
    pub fn time<R>(&mut self, update: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = update();
        self.samples.push(start.elapsed());
        self.frames += 1;
        result
    }

    /// Updates timed since creation, not just those still in the window.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn updates_per_second(&self) -> f64 {
        let average = self.samples.average().as_secs_f64();
        if average > 0.0 {
            1.0 / average
        } else {
            0.0
        }
    }

    pub fn average_ms(&self) -> f64 {
        self.samples.average().as_secs_f64() * 1000.0
    }

    pub fn range_ms(&self) -> (f64, f64) {
        let (min, max) = self.samples.min_max();
        (min.as_secs_f64() * 1000.0, max.as_secs_f64() * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_passes_the_result_through() {
        let mut timer = FrameTimer::new(2);
        assert_eq!(timer.time(|| 7), 7);
        timer.time(|| ());
        timer.time(|| ());
        assert_eq!(timer.frames(), 3);
        let (min, max) = timer.range_ms();
        assert!(min <= max);
        assert!(timer.average_ms() >= 0.0);
    }
}
