//! Frame timing.

use std::time::{Duration, Instant};

/// High-resolution timer driving the frame loop.
///
/// Tracks total elapsed time, per-frame delta time, and a running frame
/// counter.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    frame_count: u64,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frame_count: 0,
        }
    }

    /// Total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time elapsed since the last call to `tick()`, advancing the frame
    /// counter.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frame_count += 1;
        delta
    }

    /// Delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Number of completed ticks.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_frame_count() {
        let mut timer = Timer::new();
        assert_eq!(timer.frame_count(), 0);
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 2);
    }

    #[test]
    fn delta_is_non_negative() {
        let mut timer = Timer::new();
        assert!(timer.delta_secs() >= 0.0);
    }
}
