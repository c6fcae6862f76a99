//! # Metadata Store
//! Typed repositories for the two persisted entity kinds:
//! - [`ConfigRepository`] for the last accepted content of each source;
//! - [`YieldRateRepository`] for validation counters.
//!
//! [`JsonFileStore`] keeps one JSON document per key and replaces it through a
//! temp-file rename, so a failed write leaves the previous record in place.
//! [`MemoryStore`] backs tests and dry runs.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::RwLock,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::{fs, sync::Mutex};

use crate::dedup::content_hash;
use crate::stats::YieldRate;

const CONFIGS_DIR: &str = "configs";
const YIELD_RATES_DIR: &str = "yield_rates";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("corrupt record for {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result of a successful fetch + validate cycle. `content_hash` is always derived
/// from `content`, including after deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredConfig", into = "StoredConfig")]
pub struct ConfigMetadata {
    pub id: String,
    content: Vec<u8>,
    content_hash: String,
    pub last_updated: DateTime<Utc>,
    pub valid: bool,
    pub source_url: String,
}

impl ConfigMetadata {
    /// A valid record for `source_url`; the id is the source URL.
    pub fn new(
        source_url: impl Into<String>,
        content: Vec<u8>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        let source_url = source_url.into();
        Self {
            id: source_url.clone(),
            content_hash: content_hash(&content),
            content,
            last_updated,
            valid: true,
            source_url,
        }
    }

    pub fn mark_invalid(mut self) -> Self {
        self.valid = false;
        self
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

/// On-disk shape: text bodies stay readable, anything else falls back to a byte array.
#[derive(Serialize, Deserialize)]
struct StoredConfig {
    id: String,
    body: Body,
    last_updated: DateTime<Utc>,
    valid: bool,
    source_url: String,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<ConfigMetadata> for StoredConfig {
    fn from(m: ConfigMetadata) -> Self {
        let body = match String::from_utf8(m.content) {
            Ok(s) => Body::Text(s),
            Err(e) => Body::Bytes(e.into_bytes()),
        };
        Self {
            id: m.id,
            body,
            last_updated: m.last_updated,
            valid: m.valid,
            source_url: m.source_url,
        }
    }
}

impl From<StoredConfig> for ConfigMetadata {
    fn from(s: StoredConfig) -> Self {
        let content = match s.body {
            Body::Text(t) => t.into_bytes(),
            Body::Bytes(b) => b,
        };
        Self {
            id: s.id,
            content_hash: content_hash(&content),
            content,
            last_updated: s.last_updated,
            valid: s.valid,
            source_url: s.source_url,
        }
    }
}

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn store_config(&self, metadata: &ConfigMetadata) -> Result<(), StoreError>;
    /// `Ok(None)` when nothing is stored under `id`.
    async fn get_config(&self, id: &str) -> Result<Option<ConfigMetadata>, StoreError>;
}

#[async_trait]
pub trait YieldRateRepository: Send + Sync {
    async fn store_yield_rate(&self, key: &str, rate: &YieldRate) -> Result<(), StoreError>;
    async fn get_yield_rate(&self, key: &str) -> Result<Option<YieldRate>, StoreError>;
}

// ------------------------------------------------------------
// In-memory
// ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    configs: RwLock<HashMap<String, ConfigMetadata>>,
    yield_rates: RwLock<HashMap<String, YieldRate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_count(&self) -> usize {
        self.configs.read().expect("memory store poisoned").len()
    }
}

#[async_trait]
impl ConfigRepository for MemoryStore {
    async fn store_config(&self, metadata: &ConfigMetadata) -> Result<(), StoreError> {
        self.configs
            .write()
            .expect("memory store poisoned")
            .insert(metadata.id.clone(), metadata.clone());
        Ok(())
    }

    async fn get_config(&self, id: &str) -> Result<Option<ConfigMetadata>, StoreError> {
        Ok(self
            .configs
            .read()
            .expect("memory store poisoned")
            .get(id)
            .cloned())
    }
}

#[async_trait]
impl YieldRateRepository for MemoryStore {
    async fn store_yield_rate(&self, key: &str, rate: &YieldRate) -> Result<(), StoreError> {
        self.yield_rates
            .write()
            .expect("memory store poisoned")
            .insert(key.to_string(), *rate);
        Ok(())
    }

    async fn get_yield_rate(&self, key: &str) -> Result<Option<YieldRate>, StoreError> {
        Ok(self
            .yield_rates
            .read()
            .expect("memory store poisoned")
            .get(key)
            .copied())
    }
}

// ------------------------------------------------------------
// JSON files
// ------------------------------------------------------------

#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for dir in [CONFIGS_DIR, YIELD_RATES_DIR] {
            let p = root.join(dir);
            fs::create_dir_all(&p).await.map_err(|source| StoreError::Io {
                key: p.display().to_string(),
                source,
            })?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, kind: &str, key: &str) -> PathBuf {
        let digest = content_hash(key.as_bytes());
        self.root.join(kind).join(format!("{}.json", &digest[..32]))
    }

    async fn write_json<T: Serialize>(
        &self,
        kind: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        let path = self.path_for(kind, key);
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };

        let _guard = self.write_lock.lock().await;
        fs::write(&tmp, &bytes).await.map_err(io_err)?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        kind: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match fs::read(self.path_for(kind, key)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredYieldRate {
    key: String,
    #[serde(flatten)]
    rate: YieldRate,
}

#[async_trait]
impl ConfigRepository for JsonFileStore {
    async fn store_config(&self, metadata: &ConfigMetadata) -> Result<(), StoreError> {
        self.write_json(CONFIGS_DIR, &metadata.id, metadata).await
    }

    async fn get_config(&self, id: &str) -> Result<Option<ConfigMetadata>, StoreError> {
        self.read_json(CONFIGS_DIR, id).await
    }
}

#[async_trait]
impl YieldRateRepository for JsonFileStore {
    async fn store_yield_rate(&self, key: &str, rate: &YieldRate) -> Result<(), StoreError> {
        let record = StoredYieldRate {
            key: key.to_string(),
            rate: *rate,
        };
        self.write_json(YIELD_RATES_DIR, key, &record).await
    }

    async fn get_yield_rate(&self, key: &str) -> Result<Option<YieldRate>, StoreError> {
        let record: Option<StoredYieldRate> = self.read_json(YIELD_RATES_DIR, key).await?;
        Ok(record.map(|r| r.rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn hash_is_derived_from_content() {
        let m = ConfigMetadata::new("https://s/prod", b"vmess://abc".to_vec(), ts());
        assert_eq!(m.content_hash(), content_hash(b"vmess://abc"));
        assert_eq!(m.id, "https://s/prod");
        assert!(m.valid);
    }

    #[test]
    fn serde_roundtrip_rederives_hash_for_binary_body() {
        let m = ConfigMetadata::new("u", vec![0xff, 0x00, 0x7f], ts()).mark_invalid();
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"body\":[255,0,127]"));
        let back: ConfigMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn text_body_is_stored_as_string() {
        let m = ConfigMetadata::new("u", b"ss://line".to_vec(), ts());
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["body"], serde_json::json!("ss://line"));
    }

    #[tokio::test]
    async fn memory_store_missing_key_is_none() {
        let s = MemoryStore::new();
        assert!(s.get_config("missing").await.unwrap().is_none());
        assert!(s.get_yield_rate("missing").await.unwrap().is_none());
    }
}
