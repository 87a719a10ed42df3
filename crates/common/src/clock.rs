//! Clock and pacing utilities for the capture pipeline.
//!
//! Camera frames, composited frames and encoded output are all stamped
//! against a monotonic epoch taken when the stream starts. Output file names
//! use wall-clock milliseconds instead.

use std::time::{Duration, Instant};

/// A monotonic clock anchored at the moment a stream started.
#[derive(Debug, Clone, Copy)]
pub struct RecordingClock {
    epoch: Instant,
}

impl RecordingClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Nanoseconds elapsed since the epoch.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Milliseconds elapsed since the epoch, with sub-millisecond precision.
    pub fn elapsed_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Local `YYYY-MM-DD HH:MM` rendering of a Unix millisecond timestamp.
pub fn format_unix_millis(ms: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(ms) {
        Some(utc) => utc
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => "-".to_string(),
    }
}

/// Fixed-rate pacing for worker loops.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                // Stay on the grid so a late tick doesn't push every later one.
                let behind = (current_ns - last) / self.target_interval_ns;
                self.last_tick_ns = Some(last + behind * self.target_interval_ns);
                true
            }
            _ => false,
        }
    }

    /// Time left until the next tick is due.
    pub fn until_next(&self, current_ns: u64) -> Duration {
        match self.last_tick_ns {
            None => Duration::ZERO,
            Some(last) => {
                Duration::from_nanos((last + self.target_interval_ns).saturating_sub(current_ns))
            }
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.target_interval_ns)
    }
}
