//! Structured transaction-service source.
//!
//! Preferred first because it is the only source carrying proposal state
//! (pending transactions) and confirmation metadata.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::blockchain::client::{get_json, ClientError};
use crate::blockchain::models::{classify, method_label, parse_u256};
use crate::blockchain::source::{SourceBatch, TransactionSource};
use crate::models::{Operation, TransactionRecord, TransactionStatus};

#[derive(Debug, Deserialize)]
struct MultisigTransactionsResponse {
    count: Option<i64>,
    #[serde(default)]
    results: Vec<MultisigTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultisigTransaction {
    safe_tx_hash: String,
    to: String,
    #[serde(default)]
    value: Option<String>,
    data: Option<String>,
    #[serde(default)]
    operation: u8,
    nonce: u64,
    transaction_hash: Option<String>,
    execution_date: Option<DateTime<Utc>>,
    submission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    confirmations: Vec<Confirmation>,
    confirmations_required: Option<u32>,
    is_executed: Option<bool>,
    is_successful: Option<bool>,
    block_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    #[allow(dead_code)]
    owner: String,
}

pub struct SafeServiceSource {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl SafeServiceSource {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn endpoint(&self, safe_address: &str) -> String {
        // The service only accepts checksummed addresses
        let address = Address::from_str(safe_address)
            .map(|a| a.to_checksum(None))
            .unwrap_or_else(|_| safe_address.to_string());
        format!("{}/safes/{}/multisig-transactions/", self.base_url, address)
    }
}

fn to_record(safe: &str, tx: MultisigTransaction) -> TransactionRecord {
    let status = match (&tx.transaction_hash, tx.is_executed) {
        (None, Some(true)) | (Some(_), _) => {
            if tx.is_successful == Some(false) {
                TransactionStatus::Failed
            } else {
                TransactionStatus::Executed
            }
        }
        (None, _) => TransactionStatus::Pending,
    };
    let data = tx.data.unwrap_or_else(|| "0x".to_string());
    let to = tx.to.to_ascii_lowercase();

    TransactionRecord {
        id: tx.safe_tx_hash.clone(),
        safe_tx_hash: Some(tx.safe_tx_hash),
        execution_tx_hash: tx.transaction_hash,
        from: safe.to_string(),
        tx_type: classify(safe, &to, &data),
        method: Some(method_label(&data).to_string()),
        value: tx.value.as_deref().map(parse_u256).unwrap_or_default(),
        to,
        data,
        operation: Operation::from_u8(tx.operation),
        nonce: Some(tx.nonce),
        status,
        timestamp: tx
            .execution_date
            .or(tx.submission_date)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        block_number: tx.block_number,
        confirmations: tx.confirmations.len() as u32,
        threshold: tx.confirmations_required,
        source: "safe-service".to_string(),
        token_transfers: Vec::new(),
    }
}

#[async_trait]
impl TransactionSource for SafeServiceSource {
    fn name(&self) -> &'static str {
        "safe-service"
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
        let url = self.endpoint(safe_address);
        // Unfiltered by executed/successful so pending proposals come back too
        let query = [
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("ordering", "-nonce".to_string()),
        ];

        let response: MultisigTransactionsResponse = get_json(&self.http, &url, &query).await?;
        debug!(
            "Transaction service returned {} records for {}",
            response.results.len(),
            safe_address
        );

        let records = response
            .results
            .into_iter()
            .map(|tx| to_record(safe_address, tx))
            .collect();

        Ok(SourceBatch {
            records,
            total_count: response.count,
        })
    }
}
