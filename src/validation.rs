use std::str::FromStr;

use alloy_primitives::{Address, U256};
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::TransactionStatus;

/// Upper bound on search results a caller may ask for
pub const MAX_SEARCH_RESULTS: usize = 500;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid wallet address format: {0}")]
    InvalidAddress(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Validate a `0x`-prefixed 20-byte address and return its lower-case form
pub fn validate_safe_address(address: &str) -> Result<String, ValidationError> {
    let address = address.trim();
    // Check if address is empty
    if address.is_empty() {
        return Err(ValidationError::MissingParameter("address".to_string()));
    }

    if !address.starts_with("0x") || address.len() != 42 {
        return Err(ValidationError::InvalidAddress(address.to_string()));
    }

    Address::from_str(address)
        .map(|a| a.to_string().to_ascii_lowercase())
        .map_err(|_| ValidationError::InvalidAddress(address.to_string()))
}

pub fn validate_page(page: Option<&str>) -> Result<u32, ValidationError> {
    match page {
        None => Ok(0),
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            ValidationError::InvalidParameter(format!(
                "page must be a non-negative integer, got '{}'",
                raw
            ))
        }),
    }
}

pub fn validate_status(status: &str) -> Result<TransactionStatus, ValidationError> {
    status.parse().map_err(ValidationError::InvalidParameter)
}

pub fn validate_date(name: &str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ValidationError::InvalidParameter(format!(
            "{} must be YYYY-MM-DD, got '{}'",
            name, value
        ))
    })
}

/// Amounts are decimal wei
pub fn validate_amount(name: &str, value: &str) -> Result<U256, ValidationError> {
    U256::from_str_radix(value, 10).map_err(|_| {
        ValidationError::InvalidParameter(format!(
            "{} must be a decimal integer, got '{}'",
            name, value
        ))
    })
}

pub fn validate_max_results(value: Option<&str>) -> Result<usize, ValidationError> {
    let max = match value {
        None => return Ok(50),
        Some(raw) => raw.parse::<usize>().map_err(|_| {
            ValidationError::InvalidParameter(format!(
                "max_results must be an integer, got '{}'",
                raw
            ))
        })?,
    };

    if max == 0 || max > MAX_SEARCH_RESULTS {
        return Err(ValidationError::InvalidParameter(format!(
            "max_results must be between 1 and {}",
            MAX_SEARCH_RESULTS
        )));
    }
    Ok(max)
}
