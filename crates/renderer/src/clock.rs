use std::time::{Duration, Instant};

use tracing::debug;

/// Elapsed time handed to one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockReading {
    pub elapsed_seconds: f32,
    /// Zero-based index of the frame this reading was taken for.
    pub frame: u64,
}

/// Supplies one reading per rendered frame.
pub trait FrameClock: Send {
    /// Moves the epoch to "now" and the frame index back to zero.
    fn restart(&mut self);
    fn read(&mut self) -> ClockReading;
}

pub type BoxedClock = Box<dyn FrameClock>;

/// Seconds since [`FrameClock::restart`], from the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
    frames: u64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
            frames: 0,
        }
    }
}

impl FrameClock for MonotonicClock {
    fn restart(&mut self) {
        *self = Self::default();
    }

    fn read(&mut self) -> ClockReading {
        let reading = ClockReading {
            elapsed_seconds: self.epoch.elapsed().as_secs_f32(),
            frame: self.frames,
        };
        self.frames += 1;
        reading
    }
}

/// A clock stuck at one instant; frames still count up.
#[derive(Debug, Clone, Copy)]
pub struct FrozenClock {
    seconds: f32,
    frames: u64,
}

impl FrozenClock {
    pub fn at(seconds: f32) -> Self {
        Self { seconds, frames: 0 }
    }
}

impl FrameClock for FrozenClock {
    fn restart(&mut self) {
        self.frames = 0;
    }

    fn read(&mut self) -> ClockReading {
        let reading = ClockReading {
            elapsed_seconds: self.seconds,
            frame: self.frames,
        };
        self.frames += 1;
        reading
    }
}

/// Rolling frame-rate estimate, logged once per second.
#[derive(Debug, Clone)]
pub(crate) struct FrameStats {
    window_start: Instant,
    frames_in_window: u32,
    frames_per_second: f32,
    frames_rendered: u64,
}

impl FrameStats {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames_in_window: 0,
            frames_per_second: 0.0,
            frames_rendered: 0,
        }
    }

    pub fn record(&mut self, now: Instant, reading: ClockReading) {
        self.frames_rendered += 1;
        self.frames_in_window += 1;
        let span = now.saturating_duration_since(self.window_start);
        if span < Duration::from_secs(1) {
            return;
        }
        self.frames_per_second = self.frames_in_window as f32 / span.as_secs_f32();
        self.frames_in_window = 0;
        self.window_start = now;
        debug!(
            fps = self.frames_per_second.round(),
            frame = reading.frame,
            elapsed = reading.elapsed_seconds,
            "render stats"
        );
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn frames_per_second(&self) -> f32 {
        self.frames_per_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(elapsed_seconds: f32, frame: u64) -> ClockReading {
        ClockReading {
            elapsed_seconds,
            frame,
        }
    }

    #[test]
    fn frozen_clock_repeats_and_counts() {
        let mut clock = FrozenClock::at(1.5);
        assert_eq!(clock.read(), reading(1.5, 0));
        assert_eq!(clock.read(), reading(1.5, 1));
        clock.restart();
        assert_eq!(clock.read().frame, 0);
    }

    #[test]
    fn monotonic_clock_never_goes_back() {
        let mut clock = MonotonicClock::new();
        let first = clock.read();
        let second = clock.read();
        assert!(second.elapsed_seconds >= first.elapsed_seconds);
        assert_eq!(second.frame, first.frame + 1);
    }

    #[test]
    fn stats_estimate_rate_after_a_second() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        for frame in 0..30 {
            stats.record(start + Duration::from_millis(frame * 10), reading(0.0, frame));
        }
        assert_eq!(stats.frames_per_second(), 0.0);
        stats.record(start + Duration::from_secs(1), reading(1.0, 30));
        assert_eq!(stats.frames_rendered(), 31);
        assert!((stats.frames_per_second() - 31.0).abs() < 0.5);
    }
}
