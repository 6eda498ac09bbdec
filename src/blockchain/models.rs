// Wire types for the JSON-RPC node and helpers that turn raw chain data
// into normalized transaction fields

use alloy_primitives::{hex, Address, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use serde::Deserialize;
use tracing::warn;

use crate::models::{Operation, TransactionType};

sol! {
    event ExecutionSuccess(bytes32 txHash, uint256 payment);
    event ExecutionFailure(bytes32 txHash, uint256 payment);

    function execTransaction(
        address to,
        uint256 value,
        bytes data,
        uint8 operation,
        uint256 safeTxGas,
        uint256 baseGas,
        uint256 gasPrice,
        address gasToken,
        address refundReceiver,
        bytes signatures
    ) external payable returns (bool success);
}

/// Length of one packed ECDSA signature in a Safe signature blob
const SIGNATURE_LEN: usize = 65;

pub const GENERIC_CONTRACT_LABEL: &str = "Contract Call";
pub const TRANSFER_LABEL: &str = "Transfer";

/// Known method selectors and their labels
const METHOD_LABELS: &[(&str, &str)] = &[
    ("0xa9059cbb", "Transfer Token"),
    ("0x23b872dd", "Transfer From"),
    ("0x095ea7b3", "Approve"),
    ("0x6a761202", "Execute Transaction"),
    ("0x8d80ff0a", "Multi Send"),
    ("0x0d582f13", "Add Owner"),
    ("0xf8dc5dd9", "Remove Owner"),
    ("0x694e80c3", "Change Threshold"),
    ("0x38ed1739", "Swap"),
    ("0x7ff36ab5", "Swap"),
    ("0x18cbafe5", "Swap"),
    ("0x414bf389", "Swap"),
    ("0x3593564c", "Swap"),
];

const SWAP_SELECTORS: &[&str] = &[
    "0x38ed1739",
    "0x7ff36ab5",
    "0x18cbafe5",
    "0x414bf389",
    "0x3593564c",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub input: String,
    pub value: String,
    pub nonce: Option<String>,
    pub block_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub number: Option<String>,
    pub timestamp: String,
}

/// Which Safe event a log represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEvent {
    Success,
    Failure,
}

impl ExecutionEvent {
    pub fn topics() -> Vec<String> {
        vec![
            ExecutionSuccess::SIGNATURE_HASH.to_string(),
            ExecutionFailure::SIGNATURE_HASH.to_string(),
        ]
    }

    pub fn from_topic(topic: &str) -> Option<Self> {
        if topic.eq_ignore_ascii_case(&ExecutionSuccess::SIGNATURE_HASH.to_string()) {
            Some(Self::Success)
        } else if topic.eq_ignore_ascii_case(&ExecutionFailure::SIGNATURE_HASH.to_string()) {
            Some(Self::Failure)
        } else {
            None
        }
    }
}

/// Fields recovered from `execTransaction` calldata
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedExecution {
    pub to: String,
    pub value: U256,
    pub data: String,
    pub operation: Operation,
    pub confirmations: u32,
}

impl DecodedExecution {
    /// Zero values used when the calldata cannot be decoded
    pub fn fallback() -> Self {
        Self {
            to: Address::ZERO.to_string().to_ascii_lowercase(),
            value: U256::ZERO,
            data: "0x".to_string(),
            operation: Operation::Call,
            confirmations: 0,
        }
    }
}

/// Decode `execTransaction` calldata, falling back to zero values on failure
pub fn decode_exec_transaction(input: &str) -> DecodedExecution {
    let bytes = match hex::decode(input) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Undecodable calldata hex: {}", e);
            return DecodedExecution::fallback();
        }
    };

    match execTransactionCall::abi_decode(&bytes) {
        Ok(call) => DecodedExecution {
            to: call.to.to_string().to_ascii_lowercase(),
            value: call.value,
            data: format!("0x{}", hex::encode(&call.data)),
            operation: Operation::from_u8(call.operation),
            confirmations: (call.signatures.len() / SIGNATURE_LEN) as u32,
        },
        Err(e) => {
            warn!("Failed to decode execTransaction calldata: {}", e);
            DecodedExecution::fallback()
        }
    }
}

/// First 32-byte word of the event data, which carries the safeTxHash
pub fn safe_tx_hash_from_log(log: &RpcLog) -> Option<String> {
    let data = hex::decode(&log.data).ok()?;
    if data.len() < 32 {
        return None;
    }
    Some(format!("0x{}", hex::encode(&data[..32])))
}

/// Lower-cased `0x` + 8 hex chars, or None for empty or malformed calldata
pub fn method_selector(data: &str) -> Option<String> {
    let stripped = data.strip_prefix("0x").unwrap_or(data);
    let selector = stripped.get(..8)?;
    if !selector.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", selector.to_ascii_lowercase()))
}

fn has_calldata(data: &str) -> bool {
    !data.strip_prefix("0x").unwrap_or(data).is_empty()
}

pub fn method_label(data: &str) -> &'static str {
    match method_selector(data) {
        None if has_calldata(data) => GENERIC_CONTRACT_LABEL,
        None => TRANSFER_LABEL,
        Some(selector) => METHOD_LABELS
            .iter()
            .find(|(known, _)| *known == selector)
            .map(|(_, label)| *label)
            .unwrap_or(GENERIC_CONTRACT_LABEL),
    }
}

/// Derive the type tag from the payload and the direction of the transfer
pub fn classify(safe: &str, to: &str, data: &str) -> TransactionType {
    match method_selector(data) {
        Some(selector) if SWAP_SELECTORS.contains(&selector.as_str()) => TransactionType::Swap,
        Some(_) => TransactionType::Contract,
        None if has_calldata(data) => TransactionType::Contract,
        None if to.eq_ignore_ascii_case(safe) => TransactionType::Receive,
        None => TransactionType::Send,
    }
}

pub fn parse_hex_u64(value: &str) -> Option<u64> {
    u64::from_str_radix(value.strip_prefix("0x").unwrap_or(value), 16).ok()
}

/// Parse a decimal or `0x`-prefixed amount, zero when malformed
pub fn parse_u256(value: &str) -> U256 {
    let parsed = match value.strip_prefix("0x") {
        Some(hex_digits) if hex_digits.is_empty() => Ok(U256::ZERO),
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
        None if value.is_empty() => Ok(U256::ZERO),
        None => U256::from_str_radix(value, 10),
    };
    parsed.unwrap_or_else(|e| {
        warn!("Malformed amount '{}': {}", value, e);
        U256::ZERO
    })
}
