//! # Fetching & Validation
//! Collaborator seams the poller drives for each due source, plus the production
//! implementations: [`HttpFetcher`] downloads a subscription (optionally base64-encoded)
//! and [`LinkValidator`] accepts content that carries at least one supported share link.

use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use metrics::counter;
use thiserror::Error;

use crate::dedup::content_hash;
use crate::scheme::Scheme;
use crate::telemetry::SUBSCRIPTION_INVALID_LINES;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("{url} returned a body that is not valid base64: {source}")]
    Decode {
        url: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("{0}")]
    Other(String),
}

/// Downloaded content and its SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content: Vec<u8>,
    pub content_hash: String,
}

impl Fetched {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content_hash: content_hash(&content),
            content,
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Fetched, FetchError>;
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, content: &[u8]) -> bool;
}

// ------------------------------------------------------------
// HTTP
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base64_urls: HashSet<String>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self {
            client,
            base64_urls: HashSet::new(),
        })
    }

    /// Bodies fetched from `url` are base64-decoded before hashing.
    pub fn decode_base64_for(mut self, url: impl Into<String>) -> Self {
        self.base64_urls.insert(url.into());
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let http_err = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };
        let resp = self.client.get(url).send().await.map_err(http_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        let body = resp.bytes().await.map_err(http_err)?;

        let content = if self.base64_urls.contains(url) {
            decode_base64_body(&body).map_err(|source| FetchError::Decode {
                url: url.to_string(),
                source,
            })?
        } else {
            body.to_vec()
        };
        Ok(Fetched::new(content))
    }
}

/// Standard alphabet, whitespace ignored, padding optional.
pub fn decode_base64_body(body: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    general_purpose::STANDARD
        .decode(&compact)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(&compact))
}

// ------------------------------------------------------------
// Share-link validation
// ------------------------------------------------------------

/// Accepts content with at least one supported share link. Blank lines and `#`
/// comments are ignored; unsupported lines are counted but do not reject the body.
#[derive(Debug, Clone)]
pub struct LinkValidator {
    schemes: Vec<Scheme>,
}

impl Default for LinkValidator {
    fn default() -> Self {
        Self {
            schemes: Scheme::ALL.to_vec(),
        }
    }
}

/// Line counts produced by [`LinkValidator::inspect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub supported: usize,
    pub unsupported: usize,
}

impl LinkValidator {
    pub fn with_schemes(schemes: impl IntoIterator<Item = Scheme>) -> Self {
        Self {
            schemes: schemes.into_iter().collect(),
        }
    }

    pub fn inspect(&self, content: &[u8]) -> LinkReport {
        let text = String::from_utf8_lossy(content);
        let mut report = LinkReport::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match Scheme::of_link(line) {
                Some(s) if self.schemes.contains(&s) => report.supported += 1,
                _ => report.unsupported += 1,
            }
        }
        report
    }
}

#[async_trait]
impl Validator for LinkValidator {
    async fn validate(&self, content: &[u8]) -> bool {
        let report = self.inspect(content);
        if report.unsupported > 0 {
            counter!(SUBSCRIPTION_INVALID_LINES).increment(report.unsupported as u64);
            tracing::debug!(
                supported = report.supported,
                unsupported = report.unsupported,
                "unsupported lines in subscription"
            );
        }
        report.supported > 0
    }
}
