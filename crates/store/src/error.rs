use std::time::Duration;

use thiserror::Error;

/// Errors produced by [`LedgerStore`](crate::LedgerStore) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage call exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error("no ledger history for payer {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
