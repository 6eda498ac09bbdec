// Normalized transaction model shared by every source
// Page and filter types that flow through the cache

use alloy_primitives::U256;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Executed,
    Failed,
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "executed" => Ok(Self::Executed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Send,
    Receive,
    Contract,
    Swap,
}

/// Safe operation kind: plain call or delegatecall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    #[default]
    Call,
    DelegateCall,
}

impl Operation {
    pub fn from_u8(op: u8) -> Self {
        match op {
            1 => Self::DelegateCall,
            _ => Self::Call,
        }
    }
}

/// Decoded token movement attached by the enhancement step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub token_address: String,
    pub from: String,
    pub to: String,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub safe_tx_hash: Option<String>,
    pub execution_tx_hash: Option<String>,
    pub from: String,
    pub to: String,
    pub value: U256,
    pub data: String,
    pub operation: Operation,
    pub nonce: Option<u64>,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
    pub block_number: Option<u64>,
    pub confirmations: u32,
    pub threshold: Option<u32>,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Human label for the call, e.g. "Transfer" or "Contract Call"
    pub method: Option<String>,
    /// Name of the source that produced this record
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_transfers: Vec<TokenTransfer>,
}

impl TransactionRecord {
    /// Enforce the lifecycle invariant: pending records carry no execution
    /// data, executed/failed records always do.
    pub fn normalized(mut self) -> Self {
        match self.status {
            TransactionStatus::Pending => {
                self.block_number = None;
                self.execution_tx_hash = None;
            }
            TransactionStatus::Executed | TransactionStatus::Failed => {
                if self.block_number.is_none() {
                    self.block_number = Some(0);
                }
                if self.execution_tx_hash.is_none() {
                    self.execution_tx_hash = Some(self.id.clone());
                }
            }
        }
        self
    }

    /// Does `needle` (already lower-cased) appear in any searchable field?
    pub fn matches_query(&self, needle: &str) -> bool {
        let contains = |field: &str| field.to_ascii_lowercase().contains(needle);

        contains(&self.id)
            || self.safe_tx_hash.as_deref().is_some_and(contains)
            || self.execution_tx_hash.as_deref().is_some_and(contains)
            || contains(&self.from)
            || contains(&self.to)
            || self.value.to_string().contains(needle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub transactions: Vec<TransactionRecord>,
    /// -1 when the source does not know the total
    pub total_count: i64,
    pub has_more: bool,
    pub next_offset: u64,
    pub cache_key: String,
}

impl TransactionPage {
    pub fn empty(offset: u64) -> Self {
        Self {
            transactions: Vec::new(),
            total_count: -1,
            has_more: false,
            next_offset: offset,
            cache_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn with_status(status: TransactionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub ephemeral_count: u64,
    pub persistent_count: u64,
    pub in_flight_count: u64,
    pub approx_memory_size: u64,
}
