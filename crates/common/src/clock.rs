//! Clock and deadline utilities for export jobs.
//!
//! Every export job is anchored to a monotonic epoch recorded when the
//! job starts. This module provides:
//! - The job clock itself
//! - A watchdog deadline derived from the export duration
//! - Frame-count arithmetic shared by both export backends

use std::time::Instant;

/// A job clock that provides monotonic timestamps relative to the
/// moment an export started.
#[derive(Debug, Clone, Copy)]
pub struct ExportClock {
    /// The instant the export started.
    epoch: Instant,
}

impl ExportClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Seconds elapsed since the export started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Hard deadline after which a real-time export is forced to stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Watchdog {
    deadline_secs: f64,
}

impl Watchdog {
    /// Deadline equal to the export duration plus a fixed buffer.
    pub fn for_export(export_duration_secs: f64, buffer_secs: f64) -> Self {
        Self {
            deadline_secs: export_duration_secs.max(0.0) + buffer_secs.max(0.0),
        }
    }

    pub fn deadline_secs(&self) -> f64 {
        self.deadline_secs
    }

    /// Whether the deadline has passed at `elapsed_secs` since job start.
    pub fn expired(&self, elapsed_secs: f64) -> bool {
        elapsed_secs >= self.deadline_secs
    }
}

/// Number of frames needed to cover `duration_secs` at `fps`.
pub fn frames_for_duration(duration_secs: f64, fps: u32) -> u64 {
    if duration_secs <= 0.0 {
        return 0;
    }
    (duration_secs * fps.max(1) as f64).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = ExportClock::start();
        let first = clock.elapsed_secs();
        assert!(first < 1.0);
        assert!(clock.elapsed_secs() >= first);
    }

    #[test]
    fn test_watchdog_deadline() {
        let watchdog = Watchdog::for_export(5.0, 2.0);
        assert!((watchdog.deadline_secs() - 7.0).abs() < 1e-9);
        assert!(!watchdog.expired(6.99));
        assert!(watchdog.expired(7.0));
    }

    #[test]
    fn test_frames_for_duration_rounds_up() {
        assert_eq!(frames_for_duration(5.0, 30), 150);
        assert_eq!(frames_for_duration(5.01, 30), 151);
        assert_eq!(frames_for_duration(0.0, 30), 0);
    }
}
