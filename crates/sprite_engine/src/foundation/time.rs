//! Time management utilities

use std::time::{Duration, Instant};

/// Convert a rate in hertz into the period between events
///
/// Non-positive or non-finite rates fall back to one event per second.
pub fn period_from_hz(hz: f32) -> Duration {
    if hz.is_finite() && hz > 0.0 {
        Duration::from_secs_f64(1.0 / f64::from(hz))
    } else {
        Duration::from_secs(1)
    }
}

/// Rate limiter that fires at most once per interval
///
/// When it fires, the overshoot past the interval is carried into the next
/// window so the long-run rate stays at the cap instead of drifting below it.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    /// Create a throttle that has never fired
    pub const fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Change the interval without resetting the last firing time
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Current interval
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true and records the firing if more than one interval has elapsed
    pub fn try_fire(&mut self, now: Instant) -> bool {
        let Some(last) = self.last else {
            self.last = Some(now);
            return true;
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed <= self.interval {
            return false;
        }

        let carry = if self.interval.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_nanos(
                u64::try_from(elapsed.as_nanos() % self.interval.as_nanos()).unwrap_or(0),
            )
        };
        self.last = Some(now.checked_sub(carry).unwrap_or(now));
        true
    }
}

/// Counts presented frames per wall-clock second
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window_start: Instant,
    frames_in_window: u32,
    fps: u32,
}

impl FpsCounter {
    /// Create a counter whose first window starts at `now`
    pub const fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames_in_window: 0,
            fps: 0,
        }
    }

    /// Record one presented frame
    pub fn record_frame(&mut self, now: Instant) {
        if now.saturating_duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.fps = self.frames_in_window;
            self.frames_in_window = 0;
        }
        self.frames_in_window += 1;
    }

    /// Frames presented during the last complete second
    pub const fn fps(&self) -> u32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_fires_once_per_interval() {
        let start = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(10));
        assert!(throttle.try_fire(start));
        assert!(!throttle.try_fire(start + Duration::from_millis(5)));
        assert!(!throttle.try_fire(start + Duration::from_millis(10)));
        assert!(throttle.try_fire(start + Duration::from_millis(11)));
    }

    #[test]
    fn test_throttle_carries_overshoot() {
        let start = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(10));
        assert!(throttle.try_fire(start));
        // 25ms elapsed: fires, and the 5ms overshoot shortens the next window
        assert!(throttle.try_fire(start + Duration::from_millis(25)));
        assert!(throttle.try_fire(start + Duration::from_millis(31)));
    }

    #[test]
    fn test_fps_counter_rolls_over_each_second() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        for i in 0..30 {
            counter.record_frame(start + Duration::from_millis(i * 30));
        }
        assert_eq!(counter.fps(), 0);
        counter.record_frame(start + Duration::from_millis(1000));
        assert_eq!(counter.fps(), 30);
    }

    #[test]
    fn test_period_from_hz() {
        assert_eq!(period_from_hz(50.0), Duration::from_millis(20));
        assert_eq!(period_from_hz(0.0), Duration::from_secs(1));
    }
}
