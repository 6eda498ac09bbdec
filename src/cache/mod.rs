pub mod entry;
pub mod inflight;
pub mod keys;
pub mod tiered;

pub use entry::CacheEntry;
pub use inflight::InflightRequests;
pub use keys::CacheKey;
pub use tiered::{SweepReport, TierSettings, TieredCache};

use crate::models::TransactionPage;

pub type PageCache = TieredCache<TransactionPage>;
