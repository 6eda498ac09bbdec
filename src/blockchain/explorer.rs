//! Raw address-activity source backed by an explorer-style REST API.
//!
//! Last resort: no proposal or confirmation data, only what hit the chain.
//! Normal and internal transactions are collected over block windows,
//! walking backwards from the chain head.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::blockchain::client::{get_json, ClientError};
use crate::blockchain::models::{classify, method_label, parse_hex_u64, parse_u256};
use crate::blockchain::source::{SourceBatch, TransactionSource};
use crate::models::{Operation, TransactionRecord, TransactionStatus};

#[derive(Debug, Clone, Copy)]
pub struct ExplorerSettings {
    /// Blocks covered by one txlist request
    pub block_batch: u64,
    /// Windows scanned before giving up
    pub max_batches: u32,
    pub requests_per_second: u32,
    pub timeout: Duration,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            block_batch: 10_000,
            max_batches: 5,
            requests_per_second: 5,
            timeout: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: Option<String>,
    message: Option<String>,
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerTx {
    hash: String,
    block_number: String,
    time_stamp: String,
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    input: String,
    #[serde(rename = "txreceipt_status", default)]
    txreceipt_status: Option<String>,
    #[serde(default)]
    is_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxKind {
    Normal,
    Internal,
}

impl TxKind {
    fn action(self) -> &'static str {
        match self {
            TxKind::Normal => "txlist",
            TxKind::Internal => "txlistinternal",
        }
    }
}

impl ExplorerTx {
    fn succeeded(&self, kind: TxKind) -> bool {
        match kind {
            TxKind::Normal => {
                self.txreceipt_status.as_deref() == Some("1")
                    && self.is_error.as_deref() != Some("1")
            }
            TxKind::Internal => self.is_error.as_deref() == Some("0"),
        }
    }

    fn into_record(self, safe: &str) -> TransactionRecord {
        let to = self.to.to_ascii_lowercase();
        let data = if self.input.is_empty() { "0x".to_string() } else { self.input };
        let timestamp = self
            .time_stamp
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        TransactionRecord {
            id: self.hash.clone(),
            safe_tx_hash: None,
            execution_tx_hash: Some(self.hash),
            from: self.from.to_ascii_lowercase(),
            tx_type: classify(safe, &to, &data),
            method: Some(method_label(&data).to_string()),
            value: parse_u256(&self.value),
            to,
            data,
            operation: Operation::Call,
            nonce: None,
            status: TransactionStatus::Executed,
            timestamp,
            block_number: self.block_number.parse().ok(),
            confirmations: 0,
            threshold: None,
            source: "explorer".to_string(),
            token_transfers: Vec::new(),
        }
    }
}

pub struct ExplorerSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    settings: ExplorerSettings,
    limiter: DefaultDirectRateLimiter,
}

impl ExplorerSource {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        settings: ExplorerSettings,
    ) -> Self {
        let rate = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            settings,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        }
    }

    async fn request(
        &self,
        mut query: Vec<(&str, String)>,
    ) -> Result<ExplorerResponse, ClientError> {
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.clone()));
        }
        self.limiter.until_ready().await;
        get_json(&self.http, &self.base_url, &query).await
    }

    async fn latest_block(&self) -> Result<u64, ClientError> {
        let response = self
            .request(vec![
                ("module", "proxy".to_string()),
                ("action", "eth_blockNumber".to_string()),
            ])
            .await?;
        response
            .result
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| {
                ClientError::InvalidResponse(format!("block number {}", response.result))
            })
    }

    async fn list(
        &self,
        kind: TxKind,
        safe: &str,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<ExplorerTx>, ClientError> {
        let response = self
            .request(vec![
                ("module", "account".to_string()),
                ("action", kind.action().to_string()),
                ("address", safe.to_string()),
                ("startblock", start_block.to_string()),
                ("endblock", end_block.to_string()),
                ("sort", "desc".to_string()),
            ])
            .await?;

        match response.result {
            Value::Array(items) => serde_json::from_value(Value::Array(items))
                .map_err(|e| ClientError::InvalidResponse(e.to_string())),
            // "No transactions found" comes back as status 0 with an empty result
            Value::String(reason) if response.status.as_deref() == Some("0") => {
                if response
                    .message
                    .as_deref()
                    .is_some_and(|m| m.starts_with("No transactions"))
                {
                    Ok(Vec::new())
                } else {
                    Err(ClientError::Upstream(reason))
                }
            }
            other => Err(ClientError::InvalidResponse(other.to_string())),
        }
    }
}

#[async_trait]
impl TransactionSource for ExplorerSource {
    fn name(&self) -> &'static str {
        "explorer"
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    async fn fetch(
        &self,
        safe_address: &str,
        offset: u64,
        limit: u64,
    ) -> Result<SourceBatch, ClientError> {
        let wanted = (offset + limit) as usize;
        let mut end_block = self.latest_block().await?;
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for _ in 0..self.settings.max_batches {
            let start_block = end_block.saturating_sub(self.settings.block_batch.saturating_sub(1));

            for kind in [TxKind::Normal, TxKind::Internal] {
                let txs = match self.list(kind, safe_address, start_block, end_block).await {
                    Ok(txs) => txs,
                    Err(e) if kind == TxKind::Internal => {
                        warn!("Internal transaction listing failed for {}: {}", safe_address, e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                for tx in txs {
                    if tx.succeeded(kind) && seen.insert(tx.hash.clone()) {
                        records.push(tx.into_record(safe_address));
                    }
                }
            }

            debug!(
                "Explorer scan of blocks {}-{} for {}: {} records so far",
                start_block,
                end_block,
                safe_address,
                records.len()
            );
            if records.len() >= wanted || start_block == 0 {
                break;
            }
            end_block = start_block - 1;
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let records = records
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(SourceBatch::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const SAFE: &str = "0x5afe3855358e112b5647b952709e6165e1c1eeee";

    fn settings() -> ExplorerSettings {
        ExplorerSettings {
            block_batch: 1_000,
            max_batches: 1,
            requests_per_second: 100,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn keeps_successful_transactions_and_labels_them() {
        let mut server = Server::new_async().await;
        let _head = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("action".into(), "eth_blockNumber".into()))
            .with_status(200)
            .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": "0x7d0"}).to_string())
            .create_async()
            .await;
        let _normal = server
            .mock("GET", "/api")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("action".into(), "txlist".into()),
                Matcher::UrlEncoded("startblock".into(), "1001".into()),
                Matcher::UrlEncoded("endblock".into(), "2000".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "status": "1",
                    "message": "OK",
                    "result": [
                        {
                            "hash": "0x01", "blockNumber": "1500", "timeStamp": "1700000100",
                            "from": SAFE, "to": "0x3333333333333333333333333333333333333333",
                            "value": "7", "input": "0xa9059cbb00", "gasUsed": "21000",
                            "gasPrice": "1", "txreceipt_status": "1", "isError": "0"
                        },
                        {
                            "hash": "0x02", "blockNumber": "1400", "timeStamp": "1700000000",
                            "from": SAFE, "to": "0x3333333333333333333333333333333333333333",
                            "value": "0", "input": "0x12345678", "gasUsed": "21000",
                            "gasPrice": "1", "txreceipt_status": "0", "isError": "1"
                        }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _internal = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("action".into(), "txlistinternal".into()))
            .with_status(200)
            .with_body(
                json!({
                    "status": "1",
                    "message": "OK",
                    "result": [
                        {
                            "hash": "0x03", "blockNumber": "1600", "timeStamp": "1700000200",
                            "from": "0x4444444444444444444444444444444444444444", "to": SAFE,
                            "value": "9", "input": "", "isError": "0"
                        }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let source = source_for(&server, settings());
        let batch = source.fetch(SAFE, 0, 21).await.unwrap();

        let ids: Vec<&str> = batch.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["0x03", "0x01"]);
        assert_eq!(batch.records[0].tx_type, crate::models::TransactionType::Receive);
        assert_eq!(batch.records[1].method.as_deref(), Some("Transfer Token"));
        assert_eq!(batch.records[1].block_number, Some(1500));
    }

    fn source_for(server: &mockito::ServerGuard, settings: ExplorerSettings) -> ExplorerSource {
        ExplorerSource::new(reqwest::Client::new(), format!("{}/api", server.url()), None, settings)
    }

    fn listing(txs: Vec<serde_json::Value>) -> String {
        json!({"status": "1", "message": "OK", "result": txs}).to_string()
    }

    fn no_transactions() -> String {
        json!({"status": "0", "message": "No transactions found", "result": []}).to_string()
    }

    fn normal_tx(hash: &str, block: u64, timestamp: u64) -> serde_json::Value {
        json!({
            "hash": hash, "blockNumber": block.to_string(), "timeStamp": timestamp.to_string(),
            "from": SAFE, "to": "0x3333333333333333333333333333333333333333",
            "value": "1", "input": "0x", "txreceipt_status": "1", "isError": "0"
        })
    }

    fn window(action: &str, start: &str, end: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("action".into(), action.into()),
            Matcher::UrlEncoded("startblock".into(), start.into()),
            Matcher::UrlEncoded("endblock".into(), end.into()),
        ])
    }

    #[tokio::test]
    async fn walks_block_windows_backwards_until_enough_records() {
        let mut server = Server::new_async().await;
        let _head = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("action".into(), "eth_blockNumber".into()))
            .with_status(200)
            .with_body(json!({"result": "0x7d0"}).to_string())
            .create_async()
            .await;
        let newest = server
            .mock("GET", "/api")
            .match_query(window("txlist", "1001", "2000"))
            .with_status(200)
            .with_body(
                listing(vec![
                    normal_tx("0x0a", 1900, 1_700_000_300),
                    normal_tx("0x0b", 1800, 1_700_000_200),
                ]),
            )
            .create_async()
            .await;
        // Same hash reported again as an internal transaction
        let _newest_internal = server
            .mock("GET", "/api")
            .match_query(window("txlistinternal", "1001", "2000"))
            .with_status(200)
            .with_body(
                listing(vec![json!({
                    "hash": "0x0b", "blockNumber": "1800", "timeStamp": "1700000200",
                    "from": "0x4444444444444444444444444444444444444444", "to": SAFE,
                    "value": "5", "input": "", "isError": "0"
                })]),
            )
            .create_async()
            .await;
        let older = server
            .mock("GET", "/api")
            .match_query(window("txlist", "1", "1000"))
            .with_status(200)
            .with_body(listing(vec![normal_tx("0x0c", 900, 1_700_000_100)]))
            .create_async()
            .await;
        let _older_internal = server
            .mock("GET", "/api")
            .match_query(window("txlistinternal", "1", "1000"))
            .with_status(200)
            .with_body(no_transactions())
            .create_async()
            .await;
        let oldest = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("startblock".into(), "0".into()))
            .with_status(200)
            .with_body(listing(Vec::new()))
            .expect(0)
            .create_async()
            .await;

        let settings = ExplorerSettings {
            max_batches: 3,
            ..settings()
        };
        let source = source_for(&server, settings);
        let batch = source.fetch(SAFE, 1, 2).await.unwrap();

        newest.assert_async().await;
        older.assert_async().await;
        // Three records were enough, so the third window is never scanned
        oldest.assert_async().await;

        let ids: Vec<&str> = batch.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["0x0b", "0x0c"]);
        assert_eq!(batch.records[0].value, alloy_primitives::U256::from(1u64));
    }

    #[tokio::test]
    async fn stops_at_genesis() {
        let mut server = Server::new_async().await;
        let _head = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("action".into(), "eth_blockNumber".into()))
            .with_status(200)
            .with_body(json!({"result": "0x5"}).to_string())
            .create_async()
            .await;
        let normal = server
            .mock("GET", "/api")
            .match_query(window("txlist", "0", "5"))
            .with_status(200)
            .with_body(listing(vec![normal_tx("0x01", 3, 1_700_000_000)]))
            .expect(1)
            .create_async()
            .await;
        let internal = server
            .mock("GET", "/api")
            .match_query(window("txlistinternal", "0", "5"))
            .with_status(200)
            .with_body(no_transactions())
            .expect(1)
            .create_async()
            .await;

        let settings = ExplorerSettings {
            max_batches: 4,
            ..settings()
        };
        let source = source_for(&server, settings);
        let batch = source.fetch(SAFE, 0, 21).await.unwrap();

        normal.assert_async().await;
        internal.assert_async().await;
        assert_eq!(batch.records.len(), 1);
    }

    #[tokio::test]
    async fn no_transactions_is_an_empty_batch() {
        let mut server = Server::new_async().await;
        let _head = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("action".into(), "eth_blockNumber".into()))
            .with_status(200)
            .with_body(json!({"result": "0x10"}).to_string())
            .create_async()
            .await;
        let _lists = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("module".into(), "account".into()))
            .with_status(200)
            .with_body(no_transactions())
            .create_async()
            .await;

        let source = source_for(&server, settings());
        let batch = source.fetch(SAFE, 0, 21).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn rate_limit_message_is_an_error() {
        let mut server = Server::new_async().await;
        let _head = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("action".into(), "eth_blockNumber".into()))
            .with_status(200)
            .with_body(json!({"result": "0x10"}).to_string())
            .create_async()
            .await;
        let _lists = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("action".into(), "txlist".into()))
            .with_status(200)
            .with_body(
                json!({"status": "0", "message": "NOTOK", "result": "Max rate limit reached"})
                    .to_string(),
            )
            .create_async()
            .await;

        let source = source_for(&server, settings());
        let err = source.fetch(SAFE, 0, 21).await.unwrap_err();
        assert!(matches!(err, ClientError::Upstream(_)));
    }
}
