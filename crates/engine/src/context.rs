use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rentwatch_core::config::NoticeConfig;
use rentwatch_core::{AggregatedBalance, Clock, ThresholdPolicy};
use rentwatch_notify::{Dispatcher, NoticeParams};
use rentwatch_store::{with_deadline, IdentityStore, LedgerStore, StoreError};

/// Collaborators shared by accrual checks and reminder sweeps.
#[derive(Clone)]
pub struct EngineContext {
    pub ledger: Arc<dyn LedgerStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub clock: Arc<dyn Clock>,
    pub notice: Arc<NoticeConfig>,
    pub policy: ThresholdPolicy,
    /// Deadline applied to every ledger call.
    pub storage_timeout: Duration,
}

impl EngineContext {
    pub(crate) async fn storage<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        with_deadline(self.storage_timeout, call).await
    }

    pub(crate) fn params_for(&self, balance: &AggregatedBalance) -> NoticeParams {
        NoticeParams::new(&balance.payer_id, balance.owed(), &self.notice)
    }
}
