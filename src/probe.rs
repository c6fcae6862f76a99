//! # Latency Probe Classification
//!
//! Dialing through a proxy and timing a request is done by an external engine
//! (the [`Prober`]). This module only turns its delay samples into a verdict:
//! - fewer samples than required → `Keep` (inconclusive);
//! - every sample above `delete_above_ms` → `Delete`;
//! - every sample at or below `select_max_ms` → `Select`;
//! - otherwise `Keep`.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Keep,
    Select,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Counted as an (infinitely) slow sample.
    #[error("probe timed out")]
    Timeout,
    /// Aborts the measurement.
    #[error("probe failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Prober: Send + Sync {
    /// Round-trip delay in milliseconds through `target`.
    async fn delay_ms(&self, target: &str) -> Result<u64, ProbeError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    pub samples: usize,
    pub select_max_ms: u64,
    pub delete_above_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            samples: 3,
            select_max_ms: 1_000,
            delete_above_ms: 3_000,
        }
    }
}

pub fn classify(delays_ms: &[u64], cfg: &ProbeConfig) -> ProbeVerdict {
    if cfg.samples == 0 || delays_ms.len() < cfg.samples {
        return ProbeVerdict::Keep;
    }
    let window = &delays_ms[..cfg.samples];
    if window.iter().all(|&d| d > cfg.delete_above_ms) {
        ProbeVerdict::Delete
    } else if window.iter().all(|&d| d <= cfg.select_max_ms) {
        ProbeVerdict::Select
    } else {
        ProbeVerdict::Keep
    }
}

/// Take up to `cfg.samples` delays from `prober` and classify them.
pub async fn measure(prober: &dyn Prober, target: &str, cfg: &ProbeConfig) -> ProbeVerdict {
    let mut delays = Vec::with_capacity(cfg.samples);
    for _ in 0..cfg.samples {
        match prober.delay_ms(target).await {
            Ok(ms) => delays.push(ms),
            Err(ProbeError::Timeout) => delays.push(u64::MAX),
            Err(e) => {
                tracing::debug!(target_link = target, error = %e, "probe aborted");
                break;
            }
        }
    }
    classify(&delays, cfg)
}
