//! # Application Config
//!
//! TOML file, looked up in this order:
//! 1) `$SUBSCRIPTION_POLLER_CONFIG`
//! 2) `config/poller.toml`
//! 3) the embedded `config/default.toml`
//!
//! Sections: `[logger]`, `[telemetry]`, `[storage]`, `[poller]`, `[[subscriptions]]`.

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::poller::PollerConfig;
use crate::scheme::{Scheme, DEFAULT_SCHEME_KEY};
use crate::source::{SourceDescriptor, SourceError};

pub const ENV_CONFIG_PATH: &str = "SUBSCRIPTION_POLLER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/poller.toml";
const EMBEDDED_DEFAULT: &str = include_str!("../config/default.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("SUBSCRIPTION_POLLER_CONFIG points to non-existent path {}", .0.display())]
    MissingEnvPath(PathBuf),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub poller: PollerSection,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelemetryConfig {
    /// Prometheus listener, e.g. `"127.0.0.1:9100"`. Disabled when absent.
    #[serde(default)]
    pub metrics_listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("state/store")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerSection {
    pub scan_interval_secs: u64,
    pub concurrency: usize,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    pub priority_marker: String,
    pub request_timeout_secs: u64,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            concurrency: 5,
            min_interval_secs: 60,
            max_interval_secs: 600,
            priority_marker: "prod".to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl PollerSection {
    pub fn to_poller_config(&self) -> PollerConfig {
        PollerConfig::default()
            .with_scan_interval(Duration::from_secs(self.scan_interval_secs))
            .with_concurrency(self.concurrency)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub is_base64: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub min_interval_secs: Option<u64>,
    #[serde(default)]
    pub max_interval_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl SubscriptionConfig {
    /// Lowercased scheme, or `"mix"` when none is declared.
    pub fn scheme_key(&self) -> String {
        let s = self.scheme.trim();
        if s.is_empty() {
            DEFAULT_SCHEME_KEY.to_string()
        } else {
            s.to_ascii_lowercase()
        }
    }

    pub fn to_source(&self, defaults: &PollerSection) -> Result<SourceDescriptor, SourceError> {
        let min = self.min_interval_secs.unwrap_or(defaults.min_interval_secs);
        let max = self.max_interval_secs.unwrap_or(defaults.max_interval_secs);
        Ok(
            SourceDescriptor::new(&self.url, Duration::from_secs(min), Duration::from_secs(max))?
                .with_scheme(self.scheme_key()),
        )
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Env var, then `config/poller.toml`, then the embedded default.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(ConfigError::MissingEnvPath(pb));
            }
            return Self::from_path(&pb);
        }
        let local = PathBuf::from(DEFAULT_CONFIG_PATH);
        if local.exists() {
            return Self::from_path(&local);
        }
        Self::from_toml_str(EMBEDDED_DEFAULT)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poller.concurrency == 0 {
            return Err(ConfigError::Invalid("poller.concurrency must be >= 1".into()));
        }
        if self.poller.scan_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poller.scan_interval_secs must be >= 1".into(),
            ));
        }
        for sub in &self.subscriptions {
            let scheme = sub.scheme_key();
            if scheme != DEFAULT_SCHEME_KEY && scheme.parse::<Scheme>().is_err() {
                return Err(ConfigError::Invalid(format!(
                    "subscription {}: unknown scheme {scheme:?}",
                    sub.url
                )));
            }
            sub.to_source(&self.poller)?;
        }
        Ok(())
    }

    pub fn enabled_subscriptions(&self) -> impl Iterator<Item = &SubscriptionConfig> {
        self.subscriptions.iter().filter(|s| s.enabled)
    }

    /// Descriptors for every enabled subscription.
    pub fn sources(&self) -> Result<Vec<SourceDescriptor>, ConfigError> {
        self.enabled_subscriptions()
            .map(|s| s.to_source(&self.poller).map_err(ConfigError::from))
            .collect()
    }

    /// Every key the stats tracker may hold: source URLs and scheme keys.
    pub fn stats_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .subscriptions
            .iter()
            .flat_map(|s| [s.url.trim().to_string(), s.scheme_key()])
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}
