//! Cache key generation and management

use std::fmt;

use alloy_primitives::{hex, keccak256};

use crate::models::Filters;

/// A structured cache key that can be converted to a string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Key for one page of a wallet's history under a given filter set
    TransactionPage {
        address: String,
        page: u32,
        filters_digest: String,
    },
}

impl CacheKey {
    /// Create a new transaction page key
    pub fn transaction_page(address: &str, page: u32, filters: &Filters) -> Self {
        Self::TransactionPage {
            address: address.to_ascii_lowercase(),
            page,
            filters_digest: filters_digest(filters),
        }
    }

    /// Get the base address from a key (for prefix invalidation)
    pub fn address(&self) -> &str {
        match self {
            Self::TransactionPage { address, .. } => address,
        }
    }

    /// Prefix shared by every key belonging to `address`
    pub fn address_prefix(address: &str) -> String {
        format!("{}:", address.to_ascii_lowercase())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransactionPage { address, page, filters_digest } => {
                write!(f, "{}:{}:{}", address, page, filters_digest)
            }
        }
    }
}

/// Digest of the canonical filter serialization, identical across processes
pub fn filters_digest(filters: &Filters) -> String {
    let canonical = serde_json::to_vec(filters).unwrap_or_default();
    let hash = keccak256(&canonical);
    hex::encode(&hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionStatus;

    const SAFE: &str = "0x5aFE3855358E112B5647B952709E6165e1c1eEEe";

    #[test]
    fn key_starts_with_lowercase_address() {
        let key = CacheKey::transaction_page(SAFE, 3, &Filters::default());
        let rendered = key.to_string();

        assert!(rendered.starts_with(&CacheKey::address_prefix(SAFE)));
        assert_eq!(key.address(), SAFE.to_ascii_lowercase());
        assert!(rendered.contains(":3:"));
    }

    #[test]
    fn distinct_filters_never_collide() {
        let pending = CacheKey::transaction_page(SAFE, 0, &Filters::with_status(TransactionStatus::Pending));
        let executed = CacheKey::transaction_page(SAFE, 0, &Filters::with_status(TransactionStatus::Executed));
        let none = CacheKey::transaction_page(SAFE, 0, &Filters::default());

        assert_ne!(pending.to_string(), executed.to_string());
        assert_ne!(pending.to_string(), none.to_string());
    }

    #[test]
    fn digest_is_stable() {
        let filters = Filters::with_status(TransactionStatus::Failed);
        assert_eq!(filters_digest(&filters), filters_digest(&filters.clone()));
        assert_eq!(filters_digest(&Filters::default()).len(), 16);
    }
}
