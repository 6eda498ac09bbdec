//! Fakes shared by the integration-style tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::blockchain::{ClientError, SourceBatch, SourceChain, TransactionSource};
use crate::cache::{PageCache, TierSettings};
use crate::db::{KeyValueStore, MemoryStore, StoreError};
use crate::models::{Operation, TransactionRecord, TransactionStatus, TransactionType};
use crate::service::{HistoryService, HistorySettings};

pub const SAFE: &str = "0x5afe3855358e112b5647b952709e6165e1c1eeee";
pub const OTHER_SAFE: &str = "0x0123456789abcdef0123456789abcdef01234567";

pub enum Behavior {
    Records(Vec<TransactionRecord>),
    /// Serves offset 0, fails for anything further
    FirstPageOnly(Vec<TransactionRecord>),
    Empty,
    Fail,
}

pub struct FakeSource {
    name: &'static str,
    behavior: Behavior,
    delay: Duration,
    timeout: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<(u64, u64)>>,
}

impl FakeSource {
    pub fn new(name: &'static str, behavior: Behavior) -> Self {
        Self {
            name,
            behavior,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (offset, limit) of every fetch, in call order
    pub fn requests(&self) -> Vec<(u64, u64)> {
        self.requests.lock().unwrap().clone()
    }
}

fn slice(records: &[TransactionRecord], offset: u64, limit: u64) -> SourceBatch {
    let page: Vec<TransactionRecord> = records
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect();
    SourceBatch {
        records: page,
        total_count: Some(records.len() as i64),
    }
}

#[async_trait]
impl TransactionSource for FakeSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, _safe_address: &str, offset: u64, limit: u64) -> Result<SourceBatch, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((offset, limit));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behavior {
            Behavior::Records(records) => Ok(slice(records, offset, limit)),
            Behavior::FirstPageOnly(records) if offset == 0 => Ok(slice(records, offset, limit)),
            Behavior::FirstPageOnly(_) => Err(ClientError::Upstream(format!("{} has no page at {}", self.name, offset))),
            Behavior::Empty => Ok(SourceBatch::default()),
            Behavior::Fail => Err(ClientError::Upstream(format!("{} is down", self.name))),
        }
    }
}

/// Store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }
}

/// Record `i` of a history; larger `i` is older
pub fn record(i: u64, status: TransactionStatus) -> TransactionRecord {
    let executed = status != TransactionStatus::Pending;
    TransactionRecord {
        id: format!("0x{:064x}", i + 1),
        safe_tx_hash: Some(format!("0x{:064x}", 0x1000 + i)),
        execution_tx_hash: executed.then(|| format!("0x{:064x}", 0x2000 + i)),
        from: SAFE.to_string(),
        to: format!("0x{:040x}", 0xbeef),
        value: U256::from(1_000 * (i + 1)),
        data: "0x".to_string(),
        operation: Operation::Call,
        nonce: Some(1_000 - i),
        status,
        timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() - chrono::Duration::minutes(i as i64),
        block_number: executed.then_some(19_000_000 - i),
        confirmations: 2,
        threshold: Some(2),
        tx_type: TransactionType::Send,
        method: Some("Transfer".to_string()),
        source: "fake".to_string(),
        token_transfers: Vec::new(),
    }
}

pub fn executed_records(count: u64) -> Vec<TransactionRecord> {
    (0..count).map(|i| record(i, TransactionStatus::Executed)).collect()
}

pub fn memory_cache(settings: TierSettings) -> PageCache {
    PageCache::new(Arc::new(MemoryStore::new()), settings)
}

pub fn chain_of(sources: &[Arc<FakeSource>]) -> Arc<SourceChain> {
    let sources: Vec<Arc<dyn TransactionSource>> = sources
        .iter()
        .map(|s| s.clone() as Arc<dyn TransactionSource>)
        .collect();
    Arc::new(SourceChain::new(sources))
}

pub fn service_with(sources: &[Arc<FakeSource>], settings: HistorySettings) -> HistoryService {
    HistoryService::new(memory_cache(TierSettings::default()), chain_of(sources), settings)
}

pub fn no_preload() -> HistorySettings {
    HistorySettings {
        page_size: 20,
        preload_pages: 0,
    }
}
