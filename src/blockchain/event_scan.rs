//! On-chain event scan source.
//!
//! Reads the wallet's own ExecutionSuccess/ExecutionFailure logs over a
//! bounded window of recent blocks, then re-fetches each originating
//! transaction to recover the executed call from its calldata.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::blockchain::client::{ClientError, RpcClient};
use crate::blockchain::models::{
    classify, decode_exec_transaction, method_label, parse_hex_u64, safe_tx_hash_from_log,
    DecodedExecution, ExecutionEvent, RpcLog,
};
use crate::blockchain::source::{SourceBatch, TransactionSource};
use crate::models::{TransactionRecord, TransactionStatus};

/// Window scanned for normal requests
pub const FULL_SCAN_BLOCKS: u64 = 10_000;
/// Window scanned when only a handful of records is wanted
pub const SMALL_SCAN_BLOCKS: u64 = 1_000;
/// Requests at or below this many records use the small window
pub const SMALL_LIMIT: u64 = 10;

/// Transactions fetched concurrently per chunk
const LOOKUP_CHUNK: usize = 10;

pub struct EventScanSource {
    client: Arc<RpcClient>,
    timeout: Duration,
}

impl EventScanSource {
    pub fn new(client: Arc<RpcClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn scan_window(limit: u64) -> u64 {
        if limit <= SMALL_LIMIT {
            SMALL_SCAN_BLOCKS
        } else {
            FULL_SCAN_BLOCKS
        }
    }

    async fn block_timestamps(&self, blocks: &BTreeSet<u64>) -> HashMap<u64, DateTime<Utc>> {
        let lookups = blocks.iter().map(|&number| async move {
            let timestamp = match self.client.get_block(number).await {
                Ok(Some(block)) => parse_hex_u64(&block.timestamp)
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0)),
                Ok(None) => None,
                Err(e) => {
                    warn!("Failed to get block {}: {}", number, e);
                    None
                }
            };
            (number, timestamp)
        });

        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(number, timestamp)| timestamp.map(|t| (number, t)))
            .collect()
    }

    async fn to_record(
        &self,
        safe: &str,
        log: &RpcLog,
        timestamps: &HashMap<u64, DateTime<Utc>>,
    ) -> Option<TransactionRecord> {
        let event = log.topics.first().and_then(|t| ExecutionEvent::from_topic(t))?;
        let tx_hash = log.transaction_hash.clone()?;
        let block_number = log.block_number.as_deref().and_then(parse_hex_u64);

        let (from, decoded) = match self.client.get_transaction(&tx_hash).await {
            Ok(Some(tx)) => (tx.from.to_ascii_lowercase(), decode_exec_transaction(&tx.input)),
            Ok(None) => {
                warn!("Transaction {} for execution event not found", tx_hash);
                (safe.to_string(), DecodedExecution::fallback())
            }
            Err(e) => {
                warn!("Failed to get transaction {}: {}", tx_hash, e);
                (safe.to_string(), DecodedExecution::fallback())
            }
        };

        let status = match event {
            ExecutionEvent::Success => TransactionStatus::Executed,
            ExecutionEvent::Failure => TransactionStatus::Failed,
        };
        let timestamp = block_number
            .and_then(|n| timestamps.get(&n).copied())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Some(TransactionRecord {
            id: tx_hash.clone(),
            safe_tx_hash: safe_tx_hash_from_log(log),
            execution_tx_hash: Some(tx_hash),
            from,
            tx_type: classify(safe, &decoded.to, &decoded.data),
            method: Some(method_label(&decoded.data).to_string()),
            to: decoded.to,
            value: decoded.value,
            data: decoded.data,
            operation: decoded.operation,
            nonce: None,
            status,
            timestamp,
            block_number,
            confirmations: decoded.confirmations,
            threshold: None,
            source: "event-scan".to_string(),
            token_transfers: Vec::new(),
        })
    }
}

#[async_trait]
impl TransactionSource for EventScanSource {
    fn name(&self) -> &'static str {
        "event-scan"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(
        &self,
        safe_address: &str,
        offset: u64,
        limit: u64,
    ) -> Result<SourceBatch, ClientError> {
        let latest = self.client.block_number().await?;
        let from_block = latest.saturating_sub(Self::scan_window(limit));

        let mut logs = self
            .client
            .get_logs(safe_address, &ExecutionEvent::topics(), from_block, latest)
            .await?;
        debug!(
            "Found {} execution events for {} in blocks {}-{}",
            logs.len(),
            safe_address,
            from_block,
            latest
        );

        // Newest first, then page
        logs.sort_by_key(|log| {
            let block = log.block_number.as_deref().and_then(parse_hex_u64).unwrap_or(0);
            let index = log.log_index.as_deref().and_then(parse_hex_u64).unwrap_or(0);
            std::cmp::Reverse((block, index))
        });
        let page: Vec<RpcLog> = logs
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        if page.is_empty() {
            return Ok(SourceBatch::default());
        }

        let blocks: BTreeSet<u64> = page
            .iter()
            .filter_map(|log| log.block_number.as_deref().and_then(parse_hex_u64))
            .collect();
        let timestamps = self.block_timestamps(&blocks).await;

        let mut records = Vec::with_capacity(page.len());
        for chunk in page.chunks(LOOKUP_CHUNK) {
            let lookups = chunk
                .iter()
                .map(|log| self.to_record(safe_address, log, &timestamps));
            records.extend(join_all(lookups).await.into_iter().flatten());
        }

        Ok(SourceBatch::new(records))
    }
}
