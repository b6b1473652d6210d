//! Keel Metrics - per-phase timing and counters for world updates
//!
//! Every type here has a no-op twin that is compiled in when the `metrics`
//! feature is off, so instrumented code does not need its own `cfg` guards.
//!
//! # Usage
//!
//! ```ignore
//! use keel_metrics::PhaseProfiler;
//!
//! let mut profiler = PhaseProfiler::new(120);
//! let timer = profiler.begin();
//! // ... run the phase ...
//! profiler.record("pre_async", timer);
//! println!("{:?}", profiler.average("pre_async"));
//! ```

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod frame_timer;
#[cfg(feature = "metrics")]
mod phase_profiler;
#[cfg(feature = "metrics")]
mod ring_buffer;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use frame_timer::FrameTimer;
#[cfg(feature = "metrics")]
pub use phase_profiler::{PhaseProfiler, ScopeTimer};
#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;

// ============================================================================
// Macros for conditional compilation
// ============================================================================

/// Execute code only when metrics are enabled
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
pub struct FrameTimer;

#[cfg(not(feature = "metrics"))]
impl FrameTimer {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn time<R>(&mut self, update: impl FnOnce() -> R) -> R { update() }
    pub fn frames(&self) -> u64 { 0 }
    pub fn updates_per_second(&self) -> f64 { 0.0 }
    pub fn average_ms(&self) -> f64 { 0.0 }
    pub fn range_ms(&self) -> (f64, f64) { (0.0, 0.0) }
}

#[cfg(not(feature = "metrics"))]
pub struct RingBuffer<T>(std::marker::PhantomData<T>);

#[cfg(not(feature = "metrics"))]
impl<T> RingBuffer<T> {
    pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
    pub fn push(&mut self, _value: T) {}
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
}

#[cfg(not(feature = "metrics"))]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &'static str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn reset_all(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
impl Default for Counter {
    fn default() -> Self { Self }
}

#[cfg(not(feature = "metrics"))]
#[derive(Clone, Copy)]
pub struct ScopeTimer;

#[cfg(not(feature = "metrics"))]
pub struct PhaseProfiler;

#[cfg(not(feature = "metrics"))]
impl PhaseProfiler {
    pub fn new(_window: usize) -> Self { Self }
    pub fn begin(&self) -> ScopeTimer { ScopeTimer }
    pub fn record(&mut self, _phase: &'static str, _timer: ScopeTimer) {}
    pub fn average(&self, _phase: &str) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn last(&self, _phase: &str) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn phases(&self) -> impl Iterator<Item = &'static str> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
impl Default for PhaseProfiler {
    fn default() -> Self { Self }
}

#[cfg(test)]
mod tests {
    #[test]
    fn stubs_and_real_types_share_an_api() {
        let mut timer = super::FrameTimer::new(60);
        assert_eq!(timer.time(|| 3), 3);
        let mut counter = super::Counter::new();
        counter.increment("objects_created", 2);
        let mut profiler = super::PhaseProfiler::new(8);
        let scope = profiler.begin();
        profiler.record("pre_async", scope);
        let _ = profiler.average("pre_async");
    }
}
