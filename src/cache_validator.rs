use sha2::{Digest, Sha256};

/// Integrity wrapper for cached roster payloads.
///
/// Eligible-contractor responses are cached per ZIP; a stale or corrupted
/// entry would silently route leads to the wrong contractors, so each entry
/// carries a SHA-256 checksum that is re-verified on read. Entries that fail
/// validation are discarded and the roster is re-read from the store.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedCacheEntry {
    /// The cached payload (JSON string).
    pub data: String,
    /// SHA-256 checksum of the payload (hex encoded).
    pub checksum: String,
}

impl ValidatedCacheEntry {
    /// Wrap a payload with its computed checksum.
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// True when the payload still matches its stored checksum.
    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    /// Serialize for storage in the cache.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserialize a cache entry and return the payload only if the checksum
    /// verifies. `None` means the caller should treat the read as a miss.
    pub fn deserialize_and_validate(raw: &str) -> Option<String> {
        let entry: ValidatedCacheEntry = serde_json::from_str(raw).ok()?;
        if entry.is_valid() {
            Some(entry.data)
        } else {
            tracing::warn!("Cache entry failed checksum validation, discarding");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_validates() {
        let entry = ValidatedCacheEntry::new(r#"{"contractors":[]}"#.to_string());
        assert!(entry.is_valid());

        let restored = ValidatedCacheEntry::deserialize_and_validate(&entry.serialize());
        assert_eq!(restored.as_deref(), Some(r#"{"contractors":[]}"#));
    }

    #[test]
    fn tampered_payload_rejected() {
        let mut entry = ValidatedCacheEntry::new(r#"{"contractors":[]}"#.to_string());
        entry.data = r#"{"contractors":["injected"]}"#.to_string();
        assert!(!entry.is_valid());
        assert!(ValidatedCacheEntry::deserialize_and_validate(&entry.serialize()).is_none());
    }

    #[test]
    fn garbage_input_is_a_miss() {
        assert!(ValidatedCacheEntry::deserialize_and_validate("not json").is_none());
    }
}
