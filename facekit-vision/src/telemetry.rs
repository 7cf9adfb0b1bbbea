//! Scoped timing that doubles as the source of [`Timing`](crate::Timing)
//! values and as debug logging.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use log::{log, log_enabled, Level};

pub const TARGET: &str = "facekit::telemetry";

/// Logs how long a scope took when dropped.
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the guard, log if enabled, and return elapsed milliseconds.
    pub fn finish_ms(mut self) -> f64 {
        let elapsed = self.start.elapsed();
        if self.active {
            log!(target: TARGET, self.level, "{} completed in {:.2?}", self.label, elapsed);
        }
        self.active = false;
        millis(elapsed)
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if self.active {
            log!(
                target: TARGET,
                self.level,
                "{} completed in {:.2?}",
                self.label,
                self.start.elapsed()
            );
        }
    }
}

pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    TimingGuard {
        label: label.into(),
        level,
        start: Instant::now(),
        active: log_enabled!(target: TARGET, level),
    }
}

pub fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
