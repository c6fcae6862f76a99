//! Tracing + metrics bootstrap.

use std::net::SocketAddr;

use anyhow::Context;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggerConfig};

pub const POLLER_TICKS: &str = "poller_ticks_total";
pub const POLLER_DISPATCHED: &str = "poller_dispatched_total";
pub const POLLER_FETCH_ERRORS: &str = "poller_fetch_errors_total";
pub const POLLER_UNCHANGED: &str = "poller_unchanged_total";
pub const POLLER_STORED: &str = "poller_stored_total";
pub const POLLER_INVALID: &str = "poller_invalid_total";
pub const POLLER_STORE_ERRORS: &str = "poller_store_errors_total";
pub const POLLER_FETCH_MS: &str = "poller_fetch_ms";
pub const SUBSCRIPTION_INVALID_LINES: &str = "subscription_invalid_lines_total";

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
/// A second call is a no-op (tests may race to initialise).
pub fn init_tracing(cfg: &LoggerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let registry = tracing_subscriber::registry().with(filter);
    let res = match cfg.format {
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// One-time metrics registration against the current global recorder.
/// Call after the recorder is installed; earlier calls go to the no-op recorder.
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(register_descriptions);
}

fn register_descriptions() {
    describe_counter!(POLLER_TICKS, "Scheduler ticks processed.");
    describe_counter!(POLLER_DISPATCHED, "Sources dispatched to fetch workers.");
    describe_counter!(POLLER_FETCH_ERRORS, "Fetches that failed (network/status/decode).");
    describe_counter!(POLLER_UNCHANGED, "Fetches whose content matched the stored record.");
    describe_counter!(POLLER_STORED, "New content validated and persisted.");
    describe_counter!(POLLER_INVALID, "Changed content rejected by validation.");
    describe_counter!(POLLER_STORE_ERRORS, "Persist attempts that failed.");
    describe_histogram!(POLLER_FETCH_MS, "Fetch duration in milliseconds.");
    describe_counter!(
        SUBSCRIPTION_INVALID_LINES,
        "Subscription lines that are not a supported share link."
    );
}

/// Serve Prometheus exposition on `addr`. Needs a running Tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("prometheus: install exporter on {addr}"))?;
    describe_metrics();
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::counter;

    #[test]
    fn descriptions_reach_the_prometheus_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            register_descriptions();
            counter!(POLLER_STORED).increment(1);
        });
        let text = handle.render();
        assert!(
            text.contains("# HELP poller_stored_total New content validated and persisted."),
            "{text}"
        );
    }
}
