//! Ordered fallback over the configured sources.
//!
//! Each source gets its own timeout. The first source that yields at least
//! one record wins; results are never merged across sources.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::blockchain::source::TransactionSource;
use crate::models::{TransactionPage, TransactionRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("All transaction sources failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

pub struct SourceChain {
    sources: Vec<Arc<dyn TransactionSource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Arc<dyn TransactionSource>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Fetch one page, asking each source for `limit + 1` records so that
    /// `has_more` can be decided without a second request.
    ///
    /// Fails only when no source produced records and at least one failed.
    pub async fn fetch_page(
        &self,
        safe_address: &str,
        offset: u64,
        limit: u64,
    ) -> Result<TransactionPage, FetchError> {
        let mut failures = Vec::new();

        for source in &self.sources {
            let attempt = tokio::time::timeout(
                source.timeout(),
                source.fetch(safe_address, offset, limit + 1),
            );

            let batch = match attempt.await {
                Ok(Ok(batch)) if !batch.is_empty() => batch,
                Ok(Ok(_)) => {
                    debug!("Source {} returned no records for {}", source.name(), safe_address);
                    continue;
                }
                Ok(Err(e)) => {
                    warn!("Source {} failed for {}: {}", source.name(), safe_address, e);
                    failures.push(format!("{}: {}", source.name(), e));
                    continue;
                }
                Err(_) => {
                    // A slow source counts as an empty one
                    warn!(
                        "Source {} timed out after {:?} for {}",
                        source.name(),
                        source.timeout(),
                        safe_address
                    );
                    continue;
                }
            };

            info!(
                "Source {} returned {} records for {} at offset {}",
                source.name(),
                batch.records.len(),
                safe_address,
                offset
            );
            return Ok(build_page(batch.records, batch.total_count, offset, limit));
        }

        if failures.is_empty() {
            Ok(TransactionPage::empty(offset))
        } else {
            Err(FetchError::Exhausted(failures))
        }
    }
}

fn build_page(
    records: Vec<TransactionRecord>,
    total_count: Option<i64>,
    offset: u64,
    limit: u64,
) -> TransactionPage {
    let mut records: Vec<TransactionRecord> = records
        .into_iter()
        .map(TransactionRecord::normalized)
        .collect();
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let has_more = records.len() as u64 > limit;
    records.truncate(limit as usize);

    TransactionPage {
        next_offset: offset + records.len() as u64,
        transactions: records,
        total_count: total_count.unwrap_or(-1),
        has_more,
        cache_key: String::new(),
    }
}
