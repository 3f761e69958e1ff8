//! Throughput and time-remaining estimation for a running send job.
//!
//! Everything here is pure: the same `(job, now)` always yields the same
//! estimate. Estimates are derived at read time and never stored next to the
//! cached [`JobStatus`], so they always reflect the caller's clock rather
//! than the time of the last poll.

use chrono::{DateTime, Utc};
use serde::Serialize;

use sendwatch_core::JobStatus;

/// Samples taken earlier than this after job start are too noisy to report.
pub const MIN_ELAPSED_SECS: f64 = 3.0;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3600;

/// Derived throughput/ETA for one job.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RateEstimate {
    /// Emails per second, rounded to one decimal.
    pub rate: Option<f64>,
    /// Human-readable time remaining, e.g. `"1m 30s"`.
    pub eta: Option<String>,
}

impl RateEstimate {
    /// Not enough data to estimate anything.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        self.rate.is_none() && self.eta.is_none()
    }
}

/// Estimate rate and ETA for `job` as of `now`.
///
/// Returns [`RateEstimate::unknown`] when `startedAt` is missing, nothing has
/// been processed yet, or fewer than [`MIN_ELAPSED_SECS`] have elapsed.
pub fn estimate(job: &JobStatus, now: DateTime<Utc>) -> RateEstimate {
    let Some(started_at) = job.started_at else {
        return RateEstimate::unknown();
    };
    let processed = match job.processed_count {
        Some(p) if p > 0 => p,
        _ => return RateEstimate::unknown(),
    };

    let elapsed = (now - started_at).num_milliseconds() as f64 / 1000.0;
    if elapsed < MIN_ELAPSED_SECS {
        return RateEstimate::unknown();
    }

    let rate = processed as f64 / elapsed;
    let remaining = job.remaining();

    // ETA uses the unrounded rate; a rounded 0.0 would divide by zero.
    let eta = (remaining > 0).then(|| format_duration(remaining as f64 / rate));

    RateEstimate {
        rate: Some(round_to_tenth(rate)),
        eta,
    }
}

/// Format a duration in seconds for display.
///
/// - under a minute: `"45s"`
/// - under an hour: `"2m"` / `"2m 5s"`
/// - otherwise: `"1h"` / `"1h 1m"`
///
/// Fractional seconds round up, so a job is never shown as finishing sooner
/// than it will. Zero leftovers are omitted.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0s".to_string();
    }

    let total = seconds.ceil() as u64;

    if total < SECS_PER_MINUTE {
        return format!("{total}s");
    }

    if total < SECS_PER_HOUR {
        let minutes = total / SECS_PER_MINUTE;
        let secs = total % SECS_PER_MINUTE;
        return if secs == 0 {
            format!("{minutes}m")
        } else {
            format!("{minutes}m {secs}s")
        };
    }

    let hours = total / SECS_PER_HOUR;
    let minutes = (total % SECS_PER_HOUR) / SECS_PER_MINUTE;
    if minutes == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h {minutes}m")
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
