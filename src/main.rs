//! Subscription poller binary entrypoint.
//! Loads config, restores yield counters, runs the poll loop until Ctrl-C,
//! then persists counters back to the store.

use std::sync::Arc;

use anyhow::Context;
use subscription_poller::{
    config::AppConfig,
    selection::pick_subscription,
    telemetry::{init_tracing, install_prometheus},
    Collaborators, DecisionEngine, HttpFetcher, JsonFileStore, LinkValidator, Poller, StatsTracker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cfg = AppConfig::load().context("loading configuration")?;
    init_tracing(&cfg.logger);
    // Exporter first: descriptions only stick once a recorder is installed.
    match cfg.telemetry.metrics_listen {
        Some(addr) => install_prometheus(addr)?,
        None => tracing::debug!("metrics exporter disabled"),
    }

    let store = Arc::new(
        JsonFileStore::open(&cfg.storage.path)
            .await
            .with_context(|| format!("opening store at {}", cfg.storage.path.display()))?,
    );
    let stats = Arc::new(
        StatsTracker::load_from(store.as_ref(), &cfg.stats_keys())
            .await
            .context("restoring yield rates")?,
    );

    let mut fetcher = HttpFetcher::new(cfg.poller.request_timeout())?;
    for sub in cfg.enabled_subscriptions().filter(|s| s.is_base64) {
        fetcher = fetcher.decode_base64_for(sub.url.trim());
    }

    match pick_subscription(&cfg.subscriptions, &stats, &mut rand::rng()) {
        Ok(sub) => tracing::info!(name = %sub.name, url = %sub.url, "preferred subscription"),
        Err(e) => tracing::warn!(error = %e, "no subscription to prefer"),
    }

    let sources = cfg.sources()?;
    if sources.is_empty() {
        tracing::warn!("no enabled subscriptions configured; poller will idle");
    }

    let deps = Collaborators {
        fetcher: Arc::new(fetcher),
        validator: Arc::new(LinkValidator::default()),
        store: store.clone(),
        engine: Arc::new(DecisionEngine::with_default_strategies(
            &cfg.poller.priority_marker,
        )),
        stats: Arc::clone(&stats),
    };
    let poller = Arc::new(Poller::new(deps, sources, cfg.poller.to_poller_config()));
    let handle = poller.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested");
    handle.stop().await;

    stats
        .persist_to(store.as_ref())
        .await
        .context("persisting yield rates")?;
    tracing::info!(keys = stats.snapshot().len(), "yield rates saved");
    Ok(())
}
