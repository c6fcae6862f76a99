//! # Content Deduper
//! Decides whether freshly fetched bytes must replace the stored record.
//! Pure: no I/O, no logging.

use sha2::{Digest, Sha256};

use crate::store::ConfigMetadata;

/// Lowercase hex SHA-256 of `content`.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDeduper;

impl ContentDeduper {
    pub fn new() -> Self {
        Self
    }

    /// `true` unless `previous` is valid and holds exactly the same bytes.
    ///
    /// The previous hash is the one cached on the record, which is always derived
    /// from its content, so this matches recomputing it.
    pub fn should_store(&self, new_content: &[u8], previous: Option<&ConfigMetadata>) -> bool {
        match previous {
            Some(prev) if prev.valid => prev.content_hash() != content_hash(new_content),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn hash_is_fixed_length_hex() {
        let h = content_hash(b"");
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn nothing_stored_means_store() {
        assert!(ContentDeduper::new().should_store(b"vless://x", None));
    }

    #[test]
    fn same_valid_content_is_skipped_every_time() {
        let d = ContentDeduper::new();
        let prev = ConfigMetadata::new("u", b"vless://x".to_vec(), Utc::now());
        assert!(!d.should_store(b"vless://x", Some(&prev)));
        assert!(!d.should_store(b"vless://x", Some(&prev)));
    }

    #[test]
    fn invalid_previous_is_replaced_even_if_identical() {
        let d = ContentDeduper::new();
        let prev = ConfigMetadata::new("u", b"vless://x".to_vec(), Utc::now()).mark_invalid();
        assert!(d.should_store(b"vless://x", Some(&prev)));
    }

    #[test]
    fn changed_content_is_stored() {
        let d = ContentDeduper::new();
        let prev = ConfigMetadata::new("u", b"vless://x".to_vec(), Utc::now());
        assert!(d.should_store(b"vless://y", Some(&prev)));
    }
}
