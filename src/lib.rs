// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod telemetry;

// Primitives
pub mod dedup;
pub mod sampler;
pub mod scheme;
pub mod stats;

// Decision engine (pluggable scoring strategies)
pub mod engine;
pub mod strategy;

// Persistence + fetching
pub mod fetch;
pub mod store;

// Scheduling
pub mod poller;
pub mod source;

// Subscription selection + latency probe classification
pub mod probe;
pub mod selection;

// ---- Re-exports for stable public API ----
pub use crate::config::{AppConfig, ConfigError, SubscriptionConfig};
pub use crate::dedup::{content_hash, ContentDeduper};
pub use crate::engine::{DecideError, DecisionEngine};
pub use crate::fetch::{FetchError, Fetched, Fetcher, HttpFetcher, LinkValidator, Validator};
pub use crate::poller::{Collaborators, CycleReport, PollOutcome, Poller, PollerConfig, PollerHandle};
pub use crate::source::SourceDescriptor;
pub use crate::stats::{StatsTracker, YieldRate};
pub use crate::store::{
    ConfigMetadata, ConfigRepository, JsonFileStore, MemoryStore, StoreError, YieldRateRepository,
};
