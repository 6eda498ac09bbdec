use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::blockchain::models::{parse_hex_u64, RpcBlock, RpcLog, RpcTransaction};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ClientError {
    /// Worth retrying: rate limiting, server errors, connection problems
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e
                        .status()
                        .map(|s| s.as_u16() == 429 || s.is_server_error())
                        .unwrap_or(false)
            }
            _ => false,
        }
    }
}

fn retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(2)
}

/// GET a JSON document, retrying transient failures with exponential backoff
pub async fn get_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, ClientError> {
    let fetch = || async move {
        let response = http.get(url).query(query).send().await?.error_for_status()?;
        Ok::<T, ClientError>(response.json::<T>().await?)
    };

    fetch
        .retry(retry_policy())
        .when(ClientError::is_transient)
        .notify(|err: &ClientError, dur: Duration| {
            warn!("Retrying {} in {:?} after: {}", url, dur, err);
        })
        .await
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

/// Minimal Ethereum JSON-RPC client over HTTP
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Send a request whose `result` may legitimately be null
    pub async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let body = &body;
        let send = || async move {
            let response = self
                .http
                .post(&self.url)
                .json(body)
                .send()
                .await?
                .error_for_status()?;
            Ok::<RpcEnvelope<T>, ClientError>(response.json::<RpcEnvelope<T>>().await?)
        };

        let envelope = send
            .retry(retry_policy())
            .when(ClientError::is_transient)
            .notify(|err: &ClientError, dur: Duration| {
                warn!("Retrying {} in {:?} after: {}", method, dur, err);
            })
            .await?;

        if let Some(err) = envelope.error {
            return Err(ClientError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        debug!("RPC {} #{} ok", method, id);
        Ok(envelope.result)
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ClientError> {
        self.call_optional(method, params)
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("{} returned null", method)))
    }

    /// Get the latest block number
    pub async fn block_number(&self) -> Result<u64, ClientError> {
        let hex: String = self.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&hex)
            .ok_or_else(|| ClientError::InvalidResponse(format!("block number {}", hex)))
    }

    /// Logs emitted by `address` matching any of `topics` in `[from_block, to_block]`
    pub async fn get_logs(
        &self,
        address: &str,
        topics: &[String],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RpcLog>, ClientError> {
        let filter = json!({
            "address": address,
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "topics": [topics],
        });
        self.call("eth_getLogs", json!([filter])).await
    }

    pub async fn get_transaction(&self, hash: &str) -> Result<Option<RpcTransaction>, ClientError> {
        self.call_optional("eth_getTransactionByHash", json!([hash])).await
    }

    pub async fn get_block(&self, number: u64) -> Result<Option<RpcBlock>, ClientError> {
        self.call_optional("eth_getBlockByNumber", json!([format!("0x{:x}", number), false]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn block_number_is_parsed_from_hex() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_body(Matcher::Regex(r#""method"\s*:\s*"eth_blockNumber""#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
            .create_async()
            .await;

        let client = RpcClient::new(reqwest::Client::new(), server.url());
        assert_eq!(client.block_number().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn rpc_error_object_is_surfaced() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"limit exceeded"}}"#)
            .create_async()
            .await;

        let client = RpcClient::new(reqwest::Client::new(), server.url());
        let err = client.block_number().await.unwrap_err();
        assert!(matches!(err, ClientError::Rpc { code: -32005, .. }));
    }

    #[tokio::test]
    async fn null_transaction_is_none() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let client = RpcClient::new(reqwest::Client::new(), server.url());
        assert!(client.get_transaction("0xabc").await.unwrap().is_none());
    }
}
