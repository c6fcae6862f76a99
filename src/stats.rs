//! # Stats Tracker
//! Running `{yielded, total}` validation counters keyed by source URL or scheme.
//!
//! Counters are shared by every fetch worker, so increments go through atomics behind a
//! per-key `Arc`. The key map itself is only write-locked the first time a key is seen.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use serde::{Deserialize, Serialize};

use crate::store::{StoreError, YieldRateRepository};

/// Snapshot of one key's counters. Invariant: `yielded <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldRate {
    pub yielded: u64,
    pub total: u64,
}

impl YieldRate {
    /// `yielded / total`, or 0.0 when nothing has been recorded yet.
    pub fn validity_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.yielded as f64 / self.total as f64
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.total == 0
    }

    /// Integer weight in `0..=10_000` for the weighted sampler; unseen keys weigh 0.
    pub fn selection_weight(&self) -> i64 {
        if self.total == 0 {
            0
        } else {
            (self.yielded.saturating_mul(10_000) / self.total) as i64
        }
    }
}

#[derive(Debug, Default)]
struct Counter {
    yielded: AtomicU64,
    total: AtomicU64,
}

impl Counter {
    fn load(&self) -> YieldRate {
        // `total` is bumped before `yielded`, so reading in the opposite order keeps yielded <= total.
        let yielded = self.yielded.load(Ordering::SeqCst);
        let total = self.total.load(Ordering::SeqCst);
        YieldRate { yielded, total }
    }
}

/// Thread-safe validation statistics.
#[derive(Debug, Default)]
pub struct StatsTracker {
    counters: RwLock<HashMap<String, Arc<Counter>>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker pre-populated with previously persisted counters.
    /// `yielded` is clamped to `total` so a corrupt record cannot break the invariant.
    pub fn with_seed<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, YieldRate)>,
        K: Into<String>,
    {
        let counters = entries
            .into_iter()
            .map(|(k, rate)| {
                let c = Counter {
                    yielded: AtomicU64::new(rate.yielded.min(rate.total)),
                    total: AtomicU64::new(rate.total),
                };
                (k.into(), Arc::new(c))
            })
            .collect();
        Self {
            counters: RwLock::new(counters),
        }
    }

    /// Record one validation outcome for `key`.
    pub fn record_validation(&self, key: &str, is_valid: bool) {
        let counter = self.counter(key);
        counter.total.fetch_add(1, Ordering::SeqCst);
        if is_valid {
            counter.yielded.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Current counters for `key` (zero value if unseen).
    pub fn get_yield_rate(&self, key: &str) -> YieldRate {
        let map = self.counters.read().expect("stats map lock poisoned");
        map.get(key).map(|c| c.load()).unwrap_or_default()
    }

    pub fn get_validity_rate(&self, key: &str) -> f64 {
        self.get_yield_rate(key).validity_rate()
    }

    /// All counters, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, YieldRate)> {
        let map = self.counters.read().expect("stats map lock poisoned");
        let mut out: Vec<_> = map.iter().map(|(k, c)| (k.clone(), c.load())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Load the counters for `keys` from a repository. Keys without a record start at zero.
    pub async fn load_from<R>(repo: &R, keys: &[String]) -> Result<Self, StoreError>
    where
        R: YieldRateRepository + ?Sized,
    {
        let mut seeded = Vec::new();
        for key in keys {
            if let Some(rate) = repo.get_yield_rate(key).await? {
                seeded.push((key.clone(), rate));
            }
        }
        tracing::debug!(restored = seeded.len(), "yield rates loaded");
        Ok(Self::with_seed(seeded))
    }

    /// Write every counter back to the repository.
    pub async fn persist_to<R>(&self, repo: &R) -> Result<(), StoreError>
    where
        R: YieldRateRepository + ?Sized,
    {
        for (key, rate) in self.snapshot() {
            repo.store_yield_rate(&key, &rate).await?;
        }
        Ok(())
    }

    fn counter(&self, key: &str) -> Arc<Counter> {
        if let Some(c) = self
            .counters
            .read()
            .expect("stats map lock poisoned")
            .get(key)
        {
            return Arc::clone(c);
        }
        let mut map = self.counters.write().expect("stats map lock poisoned");
        Arc::clone(map.entry(key.to_string()).or_default())
    }
}
