//! Decoration step applied to fetched records before they are cached

use alloy_primitives::hex;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;

use crate::models::{TokenTransfer, TransactionRecord};

sol! {
    function transfer(address to, uint256 amount) external returns (bool);
    function transferFrom(address from, address to, uint256 amount) external returns (bool);
}

/// Opaque async transform over a batch of records for one wallet
#[async_trait]
pub trait TransactionEnhancer: Send + Sync {
    async fn enhance(
        &self,
        records: Vec<TransactionRecord>,
        safe_address: &str,
    ) -> Vec<TransactionRecord>;
}

/// Leaves records untouched
pub struct NoopEnhancer;

#[async_trait]
impl TransactionEnhancer for NoopEnhancer {
    async fn enhance(
        &self,
        records: Vec<TransactionRecord>,
        _safe_address: &str,
    ) -> Vec<TransactionRecord> {
        records
    }
}

/// Attaches ERC-20 transfers recovered from the record's own calldata
pub struct CalldataTokenEnhancer;

fn decode_token_transfer(record: &TransactionRecord, safe_address: &str) -> Option<TokenTransfer> {
    let bytes = hex::decode(&record.data).ok()?;

    if let Ok(call) = transferCall::abi_decode(&bytes) {
        return Some(TokenTransfer {
            token_address: record.to.clone(),
            from: safe_address.to_string(),
            to: call.to.to_string().to_ascii_lowercase(),
            value: call.amount,
        });
    }
    if let Ok(call) = transferFromCall::abi_decode(&bytes) {
        return Some(TokenTransfer {
            token_address: record.to.clone(),
            from: call.from.to_string().to_ascii_lowercase(),
            to: call.to.to_string().to_ascii_lowercase(),
            value: call.amount,
        });
    }
    None
}

#[async_trait]
impl TransactionEnhancer for CalldataTokenEnhancer {
    async fn enhance(
        &self,
        records: Vec<TransactionRecord>,
        safe_address: &str,
    ) -> Vec<TransactionRecord> {
        records
            .into_iter()
            .map(|mut record| {
                if record.token_transfers.is_empty() {
                    if let Some(transfer) = decode_token_transfer(&record, safe_address) {
                        record.token_transfers.push(transfer);
                    }
                }
                record
            })
            .collect()
    }
}
