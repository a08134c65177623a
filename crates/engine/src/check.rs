//! One accrual check: charge a payer for the time since they were last
//! charged, then send the initial notice if the resulting debt warrants it.
//!
//! Steps, in order:
//! 1. load and validate the identity record
//! 2. compute the pro-rata charge up to `now`
//! 3. refresh the payer directory row and post the charge
//! 4. rewrite the identity record with `last_paid_at = now`
//! 5. decide and dispatch the notice
//!
//! The identity record is rewritten before any message goes out, so a failed
//! delivery can never lead to the same period being charged again.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use rentwatch_core::clock::unix_to_str;
use rentwatch_core::{accrue, AccrualError, AggregatedBalance, Decision, LedgerEntry, NoticeKind};
use rentwatch_notify::TemplateKind;
use rentwatch_store::{IdentityError, StoreError};

use crate::context::EngineContext;

pub const ACCRUAL_NOTE: &str = "rent accrual";

#[derive(Debug, Error)]
pub enum InputError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Accrual(#[from] AccrualError),
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    #[error("ledger storage failed: {0}")]
    Storage(#[from] StoreError),

    /// The charge is posted but the identity record still holds the old
    /// timestamp. Needs manual correction before the next check.
    #[error("charge posted but identity record could not be rewritten: {0}")]
    IdentityWrite(#[source] IdentityError),
}

impl From<IdentityError> for CheckError {
    fn from(e: IdentityError) -> Self {
        CheckError::Input(InputError::Identity(e))
    }
}

impl From<AccrualError> for CheckError {
    fn from(e: AccrualError) -> Self {
        CheckError::Input(InputError::Accrual(e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NoticeStatus {
    Sent { attempts: u32 },
    Suppressed { reason: Decision },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub payer_id: String,
    /// Amount charged by this check, in minor units (non-negative).
    pub charged: i64,
    /// Aggregate including the charge just posted.
    pub balance: AggregatedBalance,
    pub notice: NoticeStatus,
}

impl CheckOutcome {
    pub fn notice_failed(&self) -> bool {
        matches!(self.notice, NoticeStatus::Failed { .. })
    }
}

/// Serializes checks that share a payer. Checks for different payers run
/// independently.
#[derive(Default)]
struct PayerLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PayerLocks {
    async fn lock_for(&self, payer_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // Drop entries nobody else holds.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(payer_id.to_string()).or_default().clone()
    }
}

pub struct AccrualCheck {
    ctx: EngineContext,
    locks: PayerLocks,
}

impl AccrualCheck {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            locks: PayerLocks::default(),
        }
    }

    pub async fn run(&self, identity_key: &str) -> Result<CheckOutcome, CheckError> {
        // Two keys can name the same identity file, so lock on the payer and
        // reload once the lock is held.
        let payer_id = self.ctx.identities.load(identity_key).await?.payer_id;
        let payer_lock = self.locks.lock_for(&payer_id).await;
        let _held = payer_lock.lock().await;

        let mut record = self.ctx.identities.load(identity_key).await?;
        let now = self.ctx.clock.now();
        let owed = accrue(record.weekly_rate, record.last_paid_at, now)?;

        let profile = record.profile();
        self.ctx.storage(self.ctx.ledger.upsert_payer(&profile)).await?;
        let entry = LedgerEntry::charge(&record.payer_id, owed, now, ACCRUAL_NOTE);
        let balance = match self.ctx.storage(self.ctx.ledger.record_charge(&entry)).await {
            Ok(balance) => balance,
            Err(StoreError::Timeout(deadline)) => self.reconcile_charge(&entry, deadline).await?,
            Err(e) => return Err(e.into()),
        };

        let previous = record.last_paid_at;
        record.last_paid_at = now;
        self.ctx
            .identities
            .save(identity_key, &record)
            .await
            .map_err(CheckError::IdentityWrite)?;

        info!(
            payer_id = %record.payer_id,
            charged = owed,
            since = %unix_to_str(previous),
            balance = balance.balance,
            "Rent accrued"
        );

        let notice = match self.ctx.policy.decide(&balance, now, NoticeKind::Initial) {
            Decision::Notify => {
                let params = self.ctx.params_for(&balance);
                match self
                    .ctx
                    .dispatcher
                    .send(&profile.notify_channel, TemplateKind::Notice, &params)
                    .await
                {
                    Ok(receipt) => NoticeStatus::Sent {
                        attempts: receipt.attempts,
                    },
                    Err(e) => {
                        warn!(payer_id = %record.payer_id, error = %e, "Charge posted but notice failed");
                        NoticeStatus::Failed { error: e.to_string() }
                    }
                }
            }
            reason => NoticeStatus::Suppressed { reason },
        };

        Ok(CheckOutcome {
            payer_id: record.payer_id,
            charged: owed,
            balance,
            notice,
        })
    }

    /// Settles a charge write that outran its deadline. The write may still
    /// have committed, so the ledger decides: if the entry is there the check
    /// carries on, otherwise the timeout stands.
    async fn reconcile_charge(
        &self,
        entry: &LedgerEntry,
        deadline: std::time::Duration,
    ) -> Result<AggregatedBalance, CheckError> {
        let entries = self.ctx.storage(self.ctx.ledger.entries_for(&entry.payer_id)).await?;
        if !entries.iter().any(|posted| posted == entry) {
            return Err(StoreError::Timeout(deadline).into());
        }
        warn!(
            payer_id = %entry.payer_id,
            deadline_secs = deadline.as_secs(),
            "Charge write exceeded its deadline but landed"
        );
        Ok(self.ctx.storage(self.ctx.ledger.aggregate_for(&entry.payer_id)).await?)
    }
}
