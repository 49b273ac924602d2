//! Transaction trail
//!
//! Every balance-affecting movement appends one [`TransactionRecord`] in the
//! same unit of work as the movement itself. Records are keyed by
//! `user_id || UUIDv7` and never rewritten.

use crate::{
    error::Result,
    storage::{keys, Table},
    types::{TransactionKind, TransactionRecord, TransactionStatus, TxId, UserId},
    unit_of_work::UnitOfWork,
};
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Random suffix length of a [`TxId`]
pub const TX_ID_SUFFIX_LEN: usize = 8;

/// `tx_<YYYYMMDDHHMMSS>_<8 alphanumerics>`
pub fn generate_tx_id(now: DateTime<Utc>) -> TxId {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TX_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();

    TxId::new(format!("tx_{}_{}", now.format("%Y%m%d%H%M%S"), suffix))
}

/// Stage a completed trail entry
pub fn append(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    asset_symbol: &str,
    amount: Decimal,
    kind: TransactionKind,
    now: DateTime<Utc>,
) -> Result<TransactionRecord> {
    let record = TransactionRecord {
        record_id: Uuid::now_v7(),
        user_id,
        asset_symbol: asset_symbol.to_string(),
        amount,
        kind,
        status: TransactionStatus::Completed,
        tx_id: generate_tx_id(now),
        created_at: now,
    };

    uow.put(
        Table::Transactions,
        keys::transaction(user_id, record.record_id),
        &record,
    )?;

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tx_id_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let tx_id = generate_tx_id(now);
        let s = tx_id.as_str();

        assert!(s.starts_with("tx_20240309070501_"));
        let suffix = &s["tx_20240309070501_".len()..];
        assert_eq!(suffix.len(), TX_ID_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_tx_ids_differ() {
        let now = Utc::now();
        assert_ne!(generate_tx_id(now), generate_tx_id(now));
    }
}
