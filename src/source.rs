//! # Source Descriptor
//! One pollable endpoint plus the bookkeeping the poller mutates for it.
//!
//! Interval policy:
//! 1. `backoff = 2^min(failure_count, 5)` minutes, only when `failure_count > 0`.
//! 2. `base = min(max_interval, min_interval + backoff)`.
//! 3. `adjustment = 1 + (1 - validity_rate)`, or 1 while the source has no recorded outcome.
//! 4. `interval = clamp(base * adjustment, min_interval, max_interval)`.
//!
//! Low reliability lengthens the interval (up to 2x base).

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::stats::YieldRate;

pub const MAX_BACKOFF_EXPONENT: u32 = 5;
pub const BACKOFF_UNIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source url must not be empty")]
    EmptyUrl,
    #[error("source {url}: min interval {min:?} exceeds max interval {max:?}")]
    InvertedBounds {
        url: String,
        min: Duration,
        max: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    url: String,
    scheme: Option<String>,
    min_interval: Duration,
    max_interval: Duration,
    pub(crate) last_check: Option<DateTime<Utc>>,
    pub(crate) failure_count: u32,
}

impl SourceDescriptor {
    pub fn new(
        url: impl Into<String>,
        min_interval: Duration,
        max_interval: Duration,
    ) -> Result<Self, SourceError> {
        let url: String = url.into();
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(SourceError::EmptyUrl);
        }
        if min_interval > max_interval {
            return Err(SourceError::InvertedBounds {
                url,
                min: min_interval,
                max: max_interval,
            });
        }
        Ok(Self {
            url,
            scheme: None,
            min_interval,
            max_interval,
            last_check: None,
            failure_count: 0,
        })
    }

    /// Scheme key whose yield rate is updated alongside the source's own.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn with_failure_count(mut self, failures: u32) -> Self {
        self.failure_count = failures;
        self
    }

    pub fn with_last_check(mut self, at: DateTime<Utc>) -> Self {
        self.last_check = Some(at);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.last_check
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Exponential backoff for the current failure streak (zero without failures).
    pub fn backoff(&self) -> Duration {
        if self.failure_count == 0 {
            Duration::ZERO
        } else {
            BACKOFF_UNIT * 2u32.pow(self.failure_count.min(MAX_BACKOFF_EXPONENT))
        }
    }

    pub fn base_interval(&self) -> Duration {
        self.min_interval
            .saturating_add(self.backoff())
            .min(self.max_interval)
    }

    /// Polling interval given the source's current yield rate.
    /// A product too large for `Duration` is treated as `max_interval`.
    pub fn compute_interval(&self, rate: &YieldRate) -> Duration {
        let scaled = self.base_interval().as_secs_f64() * reliability_adjustment(rate);
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.max_interval)
            .clamp(self.min_interval, self.max_interval)
    }

    /// Never-checked sources are always due.
    pub fn is_due(&self, now: DateTime<Utc>, rate: &YieldRate) -> bool {
        match self.last_check {
            None => true,
            Some(at) => {
                let interval = chrono::Duration::from_std(self.compute_interval(rate))
                    .unwrap_or(chrono::Duration::MAX);
                now.signed_duration_since(at) >= interval
            }
        }
    }
}

/// `1 + (1 - validity_rate)` in `[1, 2]`; 1 while nothing is known.
pub fn reliability_adjustment(rate: &YieldRate) -> f64 {
    if rate.is_unknown() {
        1.0
    } else {
        1.0 + (1.0 - rate.validity_rate().clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MIN: Duration = Duration::from_secs(60);
    const MAX: Duration = Duration::from_secs(600);

    fn src(failures: u32) -> SourceDescriptor {
        SourceDescriptor::new("https://sub.example/a", MIN, MAX)
            .unwrap()
            .with_failure_count(failures)
    }

    fn perfect() -> YieldRate {
        YieldRate { yielded: 4, total: 4 }
    }

    #[test]
    fn healthy_source_polls_at_min_interval() {
        assert_eq!(src(0).compute_interval(&perfect()), MIN);
    }

    #[test]
    fn three_failures_back_off_eight_minutes() {
        let s = src(3);
        assert_eq!(s.backoff(), Duration::from_secs(8 * 60));
        assert_eq!(s.base_interval(), Duration::from_secs(9 * 60));
        assert_eq!(s.compute_interval(&perfect()), Duration::from_secs(9 * 60));
    }

    #[test]
    fn backoff_caps_at_thirty_two_minutes() {
        assert_eq!(src(5).backoff(), Duration::from_secs(32 * 60));
        assert_eq!(src(40).backoff(), Duration::from_secs(32 * 60));
        assert_eq!(src(40).base_interval(), MAX);
    }

    #[test]
    fn interval_non_decreasing_in_failures_and_bounded() {
        let rates = [
            YieldRate::default(),
            YieldRate { yielded: 0, total: 3 },
            YieldRate { yielded: 1, total: 2 },
            perfect(),
        ];
        for rate in rates {
            let mut prev = Duration::ZERO;
            for f in 0..12 {
                let i = src(f).compute_interval(&rate);
                assert!(i >= prev, "failures {f}: {i:?} < {prev:?}");
                assert!(i >= MIN && i <= MAX);
                prev = i;
            }
        }
    }

    #[test]
    fn low_validity_lengthens_interval() {
        let s = src(0);
        let bad = YieldRate { yielded: 0, total: 5 };
        assert_eq!(s.compute_interval(&bad), Duration::from_secs(120));
        assert_eq!(reliability_adjustment(&bad), 2.0);
        assert_eq!(reliability_adjustment(&YieldRate::default()), 1.0);
    }

    #[test]
    fn inverted_bounds_rejected() {
        let err = SourceDescriptor::new("u", MAX, MIN).unwrap_err();
        assert!(matches!(err, SourceError::InvertedBounds { .. }));
        assert_eq!(
            SourceDescriptor::new("  ", MIN, MAX).unwrap_err(),
            SourceError::EmptyUrl
        );
    }

    #[test]
    fn huge_bounds_saturate_instead_of_overflowing() {
        let t0 = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let s = SourceDescriptor::new("https://sub.example/a", Duration::MAX, Duration::MAX)
            .unwrap()
            .with_failure_count(3)
            .with_last_check(t0);
        let flaky = YieldRate { yielded: 1, total: 4 };
        assert_eq!(s.base_interval(), Duration::MAX);
        assert_eq!(s.compute_interval(&flaky), Duration::MAX);
        assert!(!s.is_due(t0 + chrono::Duration::days(365), &flaky));

        let secs = Duration::from_secs(u64::MAX);
        let s = SourceDescriptor::new("https://sub.example/b", secs, secs)
            .unwrap()
            .with_failure_count(1);
        assert_eq!(s.compute_interval(&flaky), secs);
    }

    #[test]
    fn due_after_interval_elapsed() {
        let t0 = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let s = src(0).with_last_check(t0);
        assert!(!s.is_due(t0 + chrono::Duration::seconds(59), &perfect()));
        assert!(s.is_due(t0 + chrono::Duration::seconds(60), &perfect()));
        assert!(src(0).is_due(t0, &perfect()));
    }
}
