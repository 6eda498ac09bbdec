//! Filter predicates and substring search over normalized records

use crate::models::{Filters, TransactionRecord};

/// Does `record` satisfy every predicate in `filters`?
pub fn matches(record: &TransactionRecord, filters: &Filters) -> bool {
    if let Some(status) = filters.status {
        if record.status != status {
            return false;
        }
    }

    if let Some(range) = &filters.date_range {
        let day = record.timestamp.date_naive();
        if range.from.is_some_and(|from| day < from) || range.to.is_some_and(|to| day > to) {
            return false;
        }
    }

    if filters.min_value.is_some_and(|min| record.value < min) {
        return false;
    }
    if filters.max_value.is_some_and(|max| record.value > max) {
        return false;
    }

    if let Some(token) = &filters.token_address {
        let involves_token = record.to.eq_ignore_ascii_case(token)
            || record
                .token_transfers
                .iter()
                .any(|t| t.token_address.eq_ignore_ascii_case(token));
        if !involves_token {
            return false;
        }
    }

    true
}

pub fn apply_filters(records: Vec<TransactionRecord>, filters: &Filters) -> Vec<TransactionRecord> {
    if filters.is_empty() {
        return records;
    }
    records.into_iter().filter(|r| matches(r, filters)).collect()
}

/// Case-insensitive substring match on hashes, parties and value
pub fn search<'a>(
    records: impl IntoIterator<Item = &'a TransactionRecord>,
    query: &str,
) -> Vec<TransactionRecord> {
    let needle = query.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    records
        .into_iter()
        .filter(|r| r.matches_query(&needle))
        .cloned()
        .collect()
}
