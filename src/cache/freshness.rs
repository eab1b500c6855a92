//! Freshness policy for stored records

use chrono::{DateTime, Duration, Utc};

/// Returns whether a record fetched at `fetched_at` may still be served at `now`
///
/// A record is fresh while its age is strictly below `threshold_hours`. A
/// `fetched_at` in the future (clock skew) yields a negative age and is fresh.
pub fn is_fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>, threshold_hours: f64) -> bool {
    now.signed_duration_since(fetched_at) < hours_to_duration(threshold_hours)
}

fn hours_to_duration(hours: f64) -> Duration {
    if !hours.is_finite() || hours <= 0.0 {
        return Duration::zero();
    }
    let millis = (hours * 3_600_000.0).min(i64::MAX as f64 / 2.0);
    Duration::milliseconds(millis as i64)
}

/// The single global freshness threshold applied to every resource type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreshnessPolicy {
    threshold_hours: f64,
}

impl FreshnessPolicy {
    pub fn new(threshold_hours: f64) -> Self {
        Self { threshold_hours }
    }

    pub fn threshold_hours(&self) -> f64 {
        self.threshold_hours
    }

    pub fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        is_fresh(fetched_at, now, self.threshold_hours)
    }
}
