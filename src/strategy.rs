//! # Scoring Strategies
//!
//! Each strategy maps a stored config to a score in `[0.0, 1.0]` and carries a
//! non-negative weight. The decision engine sums `score * weight` per candidate.
//!
//! - [`Freshness`]: `1 / (1 + age_hours / 24)`, weight 0.4.
//! - [`SourcePriority`]: 1.0 when the source URL contains the priority marker
//!   (case-insensitive, default `"prod"`), otherwise 0.7; weight 0.3.

use chrono::{DateTime, Utc};

use crate::store::ConfigMetadata;

pub const FRESHNESS_WEIGHT: f64 = 0.4;
pub const SOURCE_PRIORITY_WEIGHT: f64 = 0.3;
pub const DEFAULT_PRIORITY_MARKER: &str = "prod";

pub trait ScoringStrategy: Send + Sync {
    /// Short identifier used in score breakdowns and logs.
    fn name(&self) -> &'static str;
    fn score(&self, candidate: &ConfigMetadata, now: DateTime<Utc>) -> f64;
    fn weight(&self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct Freshness {
    weight: f64,
}

impl Default for Freshness {
    fn default() -> Self {
        Self {
            weight: FRESHNESS_WEIGHT,
        }
    }
}

impl Freshness {
    pub fn with_weight(weight: f64) -> Self {
        Self {
            weight: weight.max(0.0),
        }
    }
}

impl ScoringStrategy for Freshness {
    fn name(&self) -> &'static str {
        "freshness"
    }

    fn score(&self, candidate: &ConfigMetadata, now: DateTime<Utc>) -> f64 {
        // Timestamps from the future count as brand new.
        let age_secs = now
            .signed_duration_since(candidate.last_updated)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;
        let age_hours = age_secs / 3600.0;
        clamp01(1.0 / (1.0 + age_hours / 24.0))
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

#[derive(Debug, Clone)]
pub struct SourcePriority {
    marker: String,
    weight: f64,
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self::new(DEFAULT_PRIORITY_MARKER)
    }
}

impl SourcePriority {
    pub fn new(marker: impl Into<String>) -> Self {
        let marker: String = marker.into();
        Self {
            marker: marker.trim().to_ascii_lowercase(),
            weight: SOURCE_PRIORITY_WEIGHT,
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl ScoringStrategy for SourcePriority {
    fn name(&self) -> &'static str {
        "source_priority"
    }

    fn score(&self, candidate: &ConfigMetadata, _now: DateTime<Utc>) -> f64 {
        let url = candidate.source_url.to_ascii_lowercase();
        if !self.marker.is_empty() && url.contains(&self.marker) {
            1.0
        } else {
            0.7
        }
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

/// Freshness then source priority, the production strategy set.
pub fn default_strategies(priority_marker: &str) -> Vec<Box<dyn ScoringStrategy>> {
    vec![
        Box::new(Freshness::default()),
        Box::new(SourcePriority::new(priority_marker)),
    ]
}

/// Clamp to [0.0, 1.0]; NaN maps to 0.0.
pub(crate) fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
