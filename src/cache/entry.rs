use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached value with its validity window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub key: String,
    /// Serialized size, only tracked for the in-memory tier
    #[serde(skip)]
    pub approx_size: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, data: T, ttl: Duration) -> Self {
        let created_at = Utc::now();
        // expires_at must stay strictly after created_at
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or(chrono::Duration::MAX)
            .max(chrono::Duration::milliseconds(1));
        let expires_at = created_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            data,
            created_at,
            expires_at,
            key: key.into(),
            approx_size: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }

    pub fn remaining_ttl(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_created() {
        let entry = CacheEntry::new("k", 1u8, Duration::from_secs(300));
        assert!(entry.expires_at > entry.created_at);
        assert!(entry.is_valid());
        assert!(entry.remaining_ttl() <= Duration::from_secs(300));
    }

    #[test]
    fn zero_ttl_still_orders_timestamps() {
        let entry = CacheEntry::new("k", 1u8, Duration::ZERO);
        assert!(entry.expires_at > entry.created_at);
    }

    #[test]
    fn size_is_not_persisted() {
        let mut entry = CacheEntry::new("k", vec![1u8, 2, 3], Duration::from_secs(1));
        entry.approx_size = 42;

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"expiresAt\""));
        let back: CacheEntry<Vec<u8>> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.approx_size, 0);
        assert_eq!(back.data, vec![1, 2, 3]);
    }
}
