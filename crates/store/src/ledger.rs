//! The ledger contract.
//!
//! Only implementations of [`LedgerStore`] write to the ledger; every other
//! component sees balances through the read methods. Balances are never
//! stored: each read folds every entry for the payer, so there is no
//! "current balance" column that could drift from the entries.

use std::future::Future;
use std::time::Duration;

use rentwatch_core::{AggregatedBalance, LedgerEntry, PayerProfile};

use crate::error::StoreError;

#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert one immutable entry. Either the whole row is written or nothing.
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// Sum every entry for one payer, joined with the payer directory.
    ///
    /// Returns [`StoreError::NotFound`] when the payer has no entries.
    async fn aggregate_for(&self, payer_id: &str) -> Result<AggregatedBalance, StoreError>;

    /// One balance per payer with ledger history, oldest activity first.
    ///
    /// Payers that only exist in the directory are not listed.
    async fn aggregate_all(&self) -> Result<Vec<AggregatedBalance>, StoreError>;

    /// Create or refresh the directory row used by the aggregate join.
    async fn upsert_payer(&self, profile: &PayerProfile) -> Result<(), StoreError>;

    /// Append `entry` and return the payer's aggregate including it.
    ///
    /// Both steps observe one consistent view, so the returned balance always
    /// reflects the entry just written.
    async fn record_charge(&self, entry: &LedgerEntry) -> Result<AggregatedBalance, StoreError>;

    /// Audit trail for one payer in insertion order.
    async fn entries_for(&self, payer_id: &str) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Cheap connectivity check.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Backend label for logs and health output (e.g. `"postgres"`).
    fn backend_name(&self) -> &str;
}

/// Run a storage call under a deadline, mapping expiry to [`StoreError::Timeout`].
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}
