//! # Poller
//! Periodic scan over subscription sources with a bounded pool of fetch workers.
//!
//! Per source: `Idle → Due → Fetching → {Stored | Unchanged | Rejected | Failed} → Idle`.
//!
//! - A ticker fires every `scan_interval`; each tick scans all sources and claims the
//!   ones that are due (`now - last_check >= compute_interval`).
//! - Claiming stamps `last_check` and sets the in-flight flag under the source's lock,
//!   so a source is never fetched by two cycles at once.
//! - Each claimed source runs as its own task; a poller-wide semaphore keeps at most
//!   `concurrency` fetches running, across ticks as well as within one.
//! - Ticks never wait for fetches. A slow source only occupies one permit.
//! - Stopping ends dispatch and waits for dispatched fetches; none are aborted mid-flight.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tokio::{
    sync::{watch, Semaphore},
    task::{JoinError, JoinHandle, JoinSet},
    time,
};

use crate::dedup::ContentDeduper;
use crate::engine::DecisionEngine;
use crate::fetch::{Fetcher, Validator};
use crate::source::SourceDescriptor;
use crate::stats::StatsTracker;
use crate::store::{ConfigMetadata, ConfigRepository, StoreError};
use crate::telemetry::{
    POLLER_DISPATCHED, POLLER_FETCH_ERRORS, POLLER_FETCH_MS, POLLER_INVALID, POLLER_STORED,
    POLLER_STORE_ERRORS, POLLER_TICKS, POLLER_UNCHANGED,
};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub scan_interval: Duration,
    pub concurrency: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl PollerConfig {
    pub fn with_scan_interval(mut self, every: Duration) -> Self {
        self.scan_interval = every.max(Duration::from_millis(1));
        self
    }

    /// At least one worker.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }
}

/// How one dispatched source ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Stored,
    Unchanged,
    Rejected,
    FetchFailed,
    StoreFailed,
}

/// Tally of one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub dispatched: usize,
    pub skipped_in_flight: usize,
    pub stored: usize,
    pub unchanged: usize,
    pub rejected: usize,
    pub fetch_failed: usize,
    pub store_failed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Stored => self.stored += 1,
            PollOutcome::Unchanged => self.unchanged += 1,
            PollOutcome::Rejected => self.rejected += 1,
            PollOutcome::FetchFailed => self.fetch_failed += 1,
            PollOutcome::StoreFailed => self.store_failed += 1,
        }
    }

    pub fn completed(&self) -> usize {
        self.stored + self.unchanged + self.rejected + self.fetch_failed + self.store_failed
    }
}

/// Everything the poller calls out to, built once at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub validator: Arc<dyn Validator>,
    pub store: Arc<dyn ConfigRepository>,
    pub engine: Arc<DecisionEngine>,
    pub stats: Arc<StatsTracker>,
}

struct SourceSlot {
    state: Mutex<SourceDescriptor>,
    in_flight: AtomicBool,
}

impl SourceSlot {
    fn lock(&self) -> std::sync::MutexGuard<'_, SourceDescriptor> {
        self.state.lock().expect("source state mutex poisoned")
    }
}

/// Clears the in-flight flag when a worker is done with a source, even on panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Poller {
    deps: Collaborators,
    deduper: ContentDeduper,
    sources: Vec<Arc<SourceSlot>>,
    permits: Arc<Semaphore>,
    cfg: PollerConfig,
}

impl Poller {
    /// Duplicate URLs are dropped (first one wins).
    pub fn new(deps: Collaborators, sources: Vec<SourceDescriptor>, cfg: PollerConfig) -> Self {
        let mut seen = HashSet::new();
        let mut slots = Vec::with_capacity(sources.len());
        for s in sources {
            if !seen.insert(s.url().to_string()) {
                tracing::warn!(url = %s.url(), "duplicate source ignored");
                continue;
            }
            slots.push(Arc::new(SourceSlot {
                state: Mutex::new(s),
                in_flight: AtomicBool::new(false),
            }));
        }
        Self {
            deps,
            deduper: ContentDeduper::new(),
            sources: slots,
            permits: Arc::new(Semaphore::new(cfg.concurrency.max(1))),
            cfg,
        }
    }

    pub fn config(&self) -> PollerConfig {
        self.cfg
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.deps.stats
    }

    /// Snapshot of every source's bookkeeping.
    pub fn sources(&self) -> Vec<SourceDescriptor> {
        self.sources.iter().map(|s| s.lock().clone()).collect()
    }

    pub fn source(&self, url: &str) -> Option<SourceDescriptor> {
        self.sources
            .iter()
            .map(|s| s.lock())
            .find(|d| d.url() == url)
            .map(|d| d.clone())
    }

    /// Start the tick loop on the current runtime.
    pub fn spawn(self: Arc<Self>) -> PollerHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run_loop(rx));
        PollerHandle { shutdown: tx, task }
    }

    /// Ticks only dispatch. Fetches run as tasks in `running` and are reaped as
    /// they finish, so a slow source never holds back the next tick.
    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.cfg.scan_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        tracing::info!(
            sources = self.sources.len(),
            workers = self.cfg.concurrency,
            every_secs = self.cfg.scan_interval.as_secs_f64(),
            "poller started"
        );

        let mut running: JoinSet<PollOutcome> = JoinSet::new();
        let mut stored_since_tick = 0usize;
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    if let Some(PollOutcome::Stored) = reap(joined) {
                        stored_since_tick += 1;
                    }
                }
                _ = ticker.tick() => {
                    if stored_since_tick > 0 {
                        stored_since_tick = 0;
                        self.log_best_config().await;
                    }
                    let (dispatched, skipped) = self.dispatch_at(Utc::now(), &mut running);
                    if dispatched > 0 || skipped > 0 {
                        tracing::debug!(dispatched, skipped_in_flight = skipped, running = running.len(), "poll tick");
                    }
                }
            }
        }

        if !running.is_empty() {
            tracing::info!(running = running.len(), "waiting for dispatched fetches");
        }
        while let Some(joined) = running.join_next().await {
            reap(joined);
        }
        tracing::info!("poller stopped");
    }

    pub async fn run_cycle(self: &Arc<Self>) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// One scan at `now` that also waits for everything it dispatched.
    /// Fetches still share the poller-wide concurrency cap.
    pub async fn run_cycle_at(self: &Arc<Self>, now: DateTime<Utc>) -> CycleReport {
        let mut tasks = JoinSet::new();
        let (dispatched, skipped) = self.dispatch_at(now, &mut tasks);
        let mut report = CycleReport {
            dispatched,
            skipped_in_flight: skipped,
            ..Default::default()
        };
        while let Some(joined) = tasks.join_next().await {
            if let Some(outcome) = reap(joined) {
                report.record(outcome);
            }
        }
        report
    }

    /// Claim due sources at `now` and spawn one task each into `tasks`.
    /// Each task waits for a permit before fetching, so at most `concurrency`
    /// fetches run at once across all ticks.
    fn dispatch_at(
        self: &Arc<Self>,
        now: DateTime<Utc>,
        tasks: &mut JoinSet<PollOutcome>,
    ) -> (usize, usize) {
        counter!(POLLER_TICKS).increment(1);
        let (due, skipped) = self.claim_due(now);
        if !due.is_empty() {
            counter!(POLLER_DISPATCHED).increment(due.len() as u64);
        }
        let dispatched = due.len();
        for slot in due {
            let this = Arc::clone(self);
            let permits = Arc::clone(&self.permits);
            tasks.spawn(async move {
                let _guard = InFlight(&slot.in_flight);
                let _permit = permits
                    .acquire_owned()
                    .await
                    .expect("fetch permits are never closed");
                this.poll_source(&slot).await
            });
        }
        (dispatched, skipped)
    }

    /// Scan-and-stamp. The source lock is held across the due check and the
    /// `last_check` write so a worker's update cannot interleave.
    fn claim_due(&self, now: DateTime<Utc>) -> (Vec<Arc<SourceSlot>>, usize) {
        let mut due = Vec::new();
        let mut skipped = 0;
        for slot in &self.sources {
            let mut state = slot.lock();
            if slot.in_flight.load(Ordering::SeqCst) {
                skipped += 1;
                continue;
            }
            let rate = self.deps.stats.get_yield_rate(state.url());
            if !state.is_due(now, &rate) {
                continue;
            }
            if slot
                .in_flight
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                skipped += 1;
                continue;
            }
            state.last_check = Some(now);
            due.push(Arc::clone(slot));
        }
        (due, skipped)
    }

    async fn poll_source(&self, slot: &SourceSlot) -> PollOutcome {
        let (url, scheme) = {
            let s = slot.lock();
            (s.url().to_string(), s.scheme().map(str::to_string))
        };

        let started = Instant::now();
        let fetched = self.deps.fetcher.fetch(&url).await;
        histogram!(POLLER_FETCH_MS).record(started.elapsed().as_secs_f64() * 1_000.0);

        let fetched = match fetched {
            Ok(f) => f,
            Err(e) => {
                let attempt = {
                    let mut s = slot.lock();
                    s.failure_count = s.failure_count.saturating_add(1);
                    s.failure_count
                };
                counter!(POLLER_FETCH_ERRORS).increment(1);
                tracing::warn!(url = %url, attempt, error = %e, "fetch failed");
                return PollOutcome::FetchFailed;
            }
        };

        let previous = match self.deps.store.get_config(&url).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "reading stored config failed; treating as absent");
                None
            }
        };
        if !self.deduper.should_store(&fetched.content, previous.as_ref()) {
            counter!(POLLER_UNCHANGED).increment(1);
            tracing::trace!(url = %url, hash = %fetched.content_hash, "content unchanged");
            return PollOutcome::Unchanged;
        }

        if !self.deps.validator.validate(&fetched.content).await {
            self.record_validation(&url, scheme.as_deref(), false);
            counter!(POLLER_INVALID).increment(1);
            tracing::debug!(url = %url, "content rejected by validator");
            return PollOutcome::Rejected;
        }

        let metadata = ConfigMetadata::new(url.clone(), fetched.content, Utc::now());
        if let Err(e) = self.deps.store.store_config(&metadata).await {
            counter!(POLLER_STORE_ERRORS).increment(1);
            tracing::warn!(url = %url, error = %e, "storing config failed");
            return PollOutcome::StoreFailed;
        }

        slot.lock().failure_count = 0;
        self.record_validation(&url, scheme.as_deref(), true);
        counter!(POLLER_STORED).increment(1);
        tracing::info!(url = %url, hash = %metadata.content_hash(), bytes = metadata.content().len(), "stored new config");
        PollOutcome::Stored
    }

    fn record_validation(&self, url: &str, scheme: Option<&str>, valid: bool) {
        self.deps.stats.record_validation(url, valid);
        if let Some(scheme) = scheme {
            self.deps.stats.record_validation(scheme, valid);
        }
    }

    /// Best stored config across all sources, per the decision engine.
    /// Sources whose record cannot be read are skipped.
    pub async fn select_best(&self, now: DateTime<Utc>) -> Result<Option<ConfigMetadata>, StoreError> {
        let urls: Vec<String> = self.sources.iter().map(|s| s.lock().url().to_string()).collect();
        let mut candidates = Vec::with_capacity(urls.len());
        let mut last_err = None;
        for url in &urls {
            match self.deps.store.get_config(url).await {
                Ok(Some(c)) if c.valid => candidates.push(c),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "skipping unreadable config");
                    last_err = Some(e);
                }
            }
        }
        match self.deps.engine.decide_at(&candidates, now) {
            Ok(best) => Ok(Some(best.clone())),
            // Nothing readable at all: surface the store error instead of "none".
            Err(_) => match last_err {
                Some(e) => Err(e),
                None => Ok(None),
            },
        }
    }

    async fn log_best_config(&self) {
        match self.select_best(Utc::now()).await {
            Ok(Some(best)) => tracing::info!(
                source = %best.source_url,
                updated = %best.last_updated,
                "active config"
            ),
            Ok(None) => tracing::debug!("no stored config to choose from"),
            Err(e) => tracing::warn!(error = %e, "choosing active config failed"),
        }
    }
}

fn reap(joined: Result<PollOutcome, JoinError>) -> Option<PollOutcome> {
    match joined {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!(error = %e, "fetch task crashed");
            None
        }
    }
}

/// Handle to a running poller loop.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop dispatching and wait for every already-dispatched fetch to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "poller task ended abnormally");
        }
    }
}
