//! # Decision Engine
//! Pure, testable logic that maps a set of stored configs → the best one.
//! No I/O, suitable for unit tests and offline evaluation.
//!
//! Policy: every candidate gets `Σ strategy.score * strategy.weight`; the highest
//! aggregate wins and ties go to the earliest candidate in input order.
//! The strategy list is fixed at construction; build a new engine to change it.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::ConfigMetadata;
use crate::strategy::{self, clamp01, ScoringStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecideError {
    #[error("no candidate to decide between")]
    NoCandidate,
}

/// One candidate plus its aggregate score and per-strategy contributions.
#[derive(Debug, Clone)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a ConfigMetadata,
    pub score: f64,
    /// `(strategy name, score * weight)` in strategy order.
    pub breakdown: Vec<(&'static str, f64)>,
}

pub struct DecisionEngine {
    strategies: Vec<Box<dyn ScoringStrategy>>,
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl DecisionEngine {
    pub fn new(strategies: Vec<Box<dyn ScoringStrategy>>) -> Self {
        Self { strategies }
    }

    /// Freshness + source priority with the given priority marker.
    pub fn with_default_strategies(priority_marker: &str) -> Self {
        Self::new(strategy::default_strategies(priority_marker))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Aggregate score of a single candidate.
    pub fn score(&self, candidate: &ConfigMetadata, now: DateTime<Utc>) -> f64 {
        self.breakdown(candidate, now).iter().map(|(_, v)| v).sum()
    }

    /// Score every candidate, keeping input order.
    pub fn rank<'a>(
        &self,
        candidates: &'a [ConfigMetadata],
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate<'a>> {
        candidates
            .iter()
            .map(|c| {
                let breakdown = self.breakdown(c, now);
                let score = breakdown.iter().map(|(_, v)| v).sum();
                ScoredCandidate {
                    candidate: c,
                    score,
                    breakdown,
                }
            })
            .collect()
    }

    pub fn decide<'a>(
        &self,
        candidates: &'a [ConfigMetadata],
    ) -> Result<&'a ConfigMetadata, DecideError> {
        self.decide_at(candidates, Utc::now())
    }

    /// Arg-max over aggregate scores, evaluated at `now`.
    pub fn decide_at<'a>(
        &self,
        candidates: &'a [ConfigMetadata],
        now: DateTime<Utc>,
    ) -> Result<&'a ConfigMetadata, DecideError> {
        let mut best: Option<(&ConfigMetadata, f64)> = None;
        for c in candidates {
            let score = self.score(c, now);
            match best {
                // strictly greater: first maximum wins
                Some((_, top)) if score <= top => {}
                _ => best = Some((c, score)),
            }
        }
        best.map(|(c, _)| c).ok_or(DecideError::NoCandidate)
    }

    fn breakdown(&self, candidate: &ConfigMetadata, now: DateTime<Utc>) -> Vec<(&'static str, f64)> {
        self.strategies
            .iter()
            .map(|s| {
                let w = s.weight();
                let w = if w.is_finite() { w.max(0.0) } else { 0.0 };
                (s.name(), clamp01(s.score(candidate, now)) * w)
            })
            .collect()
    }
}
