//! Rolling per-phase timings

use crate::ring_buffer::RingBuffer;
use std::time::{Duration, Instant};

/// Start mark handed out by [`PhaseProfiler::begin`].
#[derive(Clone, Copy, Debug)]
pub struct ScopeTimer {
    start: Instant,
}

/// Keeps a window of recent durations for every named phase.
///
/// Phases are kept in first-recorded order so reports list them in the
/// order a frame runs them.
pub struct PhaseProfiler {
    window: usize,
    phases: Vec<(&'static str, RingBuffer<Duration>)>,
}

impl PhaseProfiler {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            phases: Vec::new(),
        }
    }

    pub fn begin(&self) -> ScopeTimer {
        ScopeTimer {
            start: Instant::now(),
        }
    }

    pub fn record(&mut self, phase: &'static str, timer: ScopeTimer) {
        let elapsed = timer.start.elapsed();
        match self.phases.iter_mut().find(|(name, _)| *name == phase) {
            Some((_, samples)) => samples.push(elapsed),
            None => {
                let mut samples = RingBuffer::new(self.window);
                samples.push(elapsed);
                self.phases.push((phase, samples));
            }
        }
    }

    pub fn average(&self, phase: &str) -> Duration {
        self.samples(phase)
            .map(RingBuffer::average)
            .unwrap_or(Duration::ZERO)
    }

    pub fn last(&self, phase: &str) -> Duration {
        self.samples(phase)
            .and_then(RingBuffer::latest)
            .unwrap_or(Duration::ZERO)
    }

    pub fn phases(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.phases.iter().map(|(name, _)| *name)
    }

    fn samples(&self, phase: &str) -> Option<&RingBuffer<Duration>> {
        self.phases
            .iter()
            .find(|(name, _)| *name == phase)
            .map(|(_, samples)| samples)
    }
}

impl Default for PhaseProfiler {
    fn default() -> Self {
        Self::new(120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_keep_first_recorded_order() {
        let mut profiler = PhaseProfiler::new(4);
        for phase in ["pre_async", "async", "post_async", "pre_async"] {
            let timer = profiler.begin();
            profiler.record(phase, timer);
        }
        let names: Vec<_> = profiler.phases().collect();
        assert_eq!(names, vec!["pre_async", "async", "post_async"]);
        assert_eq!(profiler.average("missing"), Duration::ZERO);
    }
}
