pub mod api;
pub mod blockchain;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod service;
pub mod validation;
pub mod state;

#[cfg(test)]
pub mod tests;

// Re-export specific items for convenience
pub use api::error::ApiError;
pub use api::response::ApiResponse;
pub use api::route::{create_router, HistoryQuery, SearchQuery};
pub use blockchain::{SourceChain, TransactionSource};
pub use cache::{PageCache, TierSettings, TieredCache};
pub use db::{KeyValueStore, MemoryStore, SqliteStore};
pub use models::{CacheStats, Filters, TransactionPage, TransactionRecord, TransactionStatus};
pub use service::{HistoryError, HistoryService, HistorySettings};
pub use validation::validate_safe_address;
