pub mod client;
pub mod event_scan;
pub mod explorer;
pub mod fetcher;
pub mod models;
pub mod safe_service;
pub mod source;

// Re-exports for convenience
pub use client::{ClientError, RpcClient};
pub use event_scan::EventScanSource;
pub use explorer::{ExplorerSettings, ExplorerSource};
pub use fetcher::{FetchError, SourceChain};
pub use safe_service::SafeServiceSource;
pub use source::{SourceBatch, TransactionSource};
