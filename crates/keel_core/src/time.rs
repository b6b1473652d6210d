//! Per-world simulation clock
//!
//! Fixed 60Hz step by default; variable stepping measures wall time between
//! updates and clamps it so a stalled frame cannot explode the simulation.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default fixed step (60 Hz = 16.666ms per tick)
pub const TICK_RATE_HZ: u32 = 60;
pub const TICK_DURATION: Duration = Duration::from_micros(16_666);

/// Largest step a variable clock will take in one update.
pub const MAX_VARIABLE_STEP: Duration = Duration::from_millis(100);

/// Fastest time scale a clock accepts.
pub const MAX_SPEED: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimeStep {
    Fixed(Duration),
    Variable,
}

impl Default for TimeStep {
    fn default() -> Self {
        TimeStep::Fixed(TICK_DURATION)
    }
}

pub struct Clock {
    step: TimeStep,
    speed: f64,
    paused: bool,
    delta: Duration,
    accumulated: Duration,
    ticks: u64,
    last_wall: Option<Instant>,
}

impl Clock {
    pub fn new(step: TimeStep) -> Self {
        Self {
            step,
            speed: 1.0,
            paused: false,
            delta: Duration::ZERO,
            accumulated: Duration::ZERO,
            ticks: 0,
            last_wall: None,
        }
    }

    /// Advance by one update and return the scaled delta.
    pub fn advance(&mut self) -> Duration {
        let raw = match self.step {
            TimeStep::Fixed(step) => step,
            TimeStep::Variable => {
                let now = Instant::now();
                let elapsed = self
                    .last_wall
                    .map(|last| now.duration_since(last))
                    .unwrap_or(Duration::ZERO);
                self.last_wall = Some(now);
                elapsed.min(MAX_VARIABLE_STEP)
            }
        };

        self.delta = if self.paused {
            Duration::ZERO
        } else {
            raw.mul_f64(self.speed)
        };
        self.accumulated += self.delta;
        self.ticks += 1;
        self.delta
    }

    /// Simulation time elapsed since the clock was created.
    pub fn now(&self) -> Duration {
        self.accumulated
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn step(&self) -> TimeStep {
        self.step
    }

    pub fn set_step(&mut self, step: TimeStep) {
        self.step = step;
        self.last_wall = None;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Clamped to `0.0..=MAX_SPEED`; NaN leaves the speed unchanged.
    pub fn set_speed(&mut self, speed: f64) {
        if speed.is_nan() {
            return;
        }
        self.speed = speed.clamp(0.0, MAX_SPEED);
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(TimeStep::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_step_accumulates() {
        let mut clock = Clock::new(TimeStep::Fixed(Duration::from_millis(10)));
        for _ in 0..3 {
            clock.advance();
        }
        assert_eq!(clock.now(), Duration::from_millis(30));
        assert_eq!(clock.ticks(), 3);
    }

    #[test]
    fn paused_clock_still_ticks_but_time_stands_still() {
        let mut clock = Clock::new(TimeStep::Fixed(Duration::from_millis(10)));
        clock.set_paused(true);
        assert_eq!(clock.advance(), Duration::ZERO);
        assert_eq!(clock.ticks(), 1);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn speed_scales_delta() {
        let mut clock = Clock::new(TimeStep::Fixed(Duration::from_millis(10)));
        clock.set_speed(2.0);
        assert_eq!(clock.advance(), Duration::from_millis(20));
        clock.set_speed(-1.0);
        assert_eq!(clock.advance(), Duration::ZERO);
    }

    #[test]
    fn out_of_range_speeds_are_clamped() {
        let mut clock = Clock::new(TimeStep::Fixed(Duration::from_millis(10)));
        clock.set_speed(f64::INFINITY);
        assert_eq!(clock.speed(), MAX_SPEED);
        assert_eq!(clock.advance(), Duration::from_secs(10));

        clock.set_speed(0.5);
        clock.set_speed(f64::NAN);
        assert_eq!(clock.speed(), 0.5);
        assert_eq!(clock.advance(), Duration::from_millis(5));
    }

    #[test]
    fn first_variable_step_is_zero() {
        let mut clock = Clock::new(TimeStep::Variable);
        assert_eq!(clock.advance(), Duration::ZERO);
        assert!(clock.advance() <= MAX_VARIABLE_STEP);
    }
}
