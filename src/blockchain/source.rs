use std::time::Duration;

use async_trait::async_trait;

use crate::blockchain::client::ClientError;
use crate::models::TransactionRecord;

/// Records returned by one source for one page request
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub records: Vec<TransactionRecord>,
    /// Total number of records the source knows about, when it reports one
    pub total_count: Option<i64>,
}

impl SourceBatch {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self {
            records,
            total_count: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One backing data source in the fallback chain.
///
/// `fetch` returns up to `limit` records starting at `offset`, newest first.
/// An empty batch means "nothing here, try the next source".
#[async_trait]
pub trait TransactionSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upper bound for a single `fetch`
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn fetch(
        &self,
        safe_address: &str,
        offset: u64,
        limit: u64,
    ) -> Result<SourceBatch, ClientError>;
}
