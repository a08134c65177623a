//! Periodic reminder sweep.
//!
//! Reads every payer's aggregate, applies the reminder policy to each one
//! independently and sends reminders with bounded concurrency. A failure for
//! one payer is recorded in the report and never stops the others. The sweep
//! posts nothing to the ledger.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rentwatch_core::{Decision, NoticeKind};
use rentwatch_notify::TemplateKind;
use rentwatch_store::StoreError;

use crate::context::EngineContext;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("a reminder sweep is already running")]
    AlreadyRunning,

    #[error("could not read balances: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub payer_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Payers with ledger history.
    pub scanned: usize,
    pub notified: usize,
    /// Payers the policy held back.
    pub suppressed: usize,
    pub failures: Vec<SweepFailure>,
    /// Payers due a reminder that were not attempted because the sweep was
    /// cancelled.
    pub skipped: usize,
    pub cancelled: bool,
}

/// Resets the scanner to idle however the sweep ends.
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum SendResult {
    Sent,
    Failed(String),
    Skipped,
}

pub struct ReminderScanner {
    ctx: EngineContext,
    concurrency: usize,
    scanning: AtomicBool,
}

impl ReminderScanner {
    pub fn new(ctx: EngineContext, concurrency: usize) -> Self {
        Self {
            ctx,
            concurrency: concurrency.max(1),
            scanning: AtomicBool::new(false),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Run one sweep. Once `cancel` fires no new sends start; sends already
    /// in flight (including their retries) finish.
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<SweepReport, SweepError> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SweepError::AlreadyRunning);
        }
        let _guard = ScanGuard(&self.scanning);

        let balances = self.ctx.storage(self.ctx.ledger.aggregate_all()).await?;
        let now = self.ctx.clock.now();
        let mut report = SweepReport {
            scanned: balances.len(),
            ..SweepReport::default()
        };

        let mut due = Vec::new();
        for balance in balances {
            match self.ctx.policy.decide(&balance, now, NoticeKind::Reminder) {
                Decision::Notify => match balance.notify_channel.clone() {
                    Some(channel) => due.push((balance, channel)),
                    None => {
                        warn!(payer_id = %balance.payer_id, "Reminder due but payer has no channel");
                        report.failures.push(SweepFailure {
                            payer_id: balance.payer_id,
                            error: "no notification channel on record".into(),
                        });
                    }
                },
                reason => {
                    debug!(payer_id = %balance.payer_id, ?reason, "Reminder suppressed");
                    report.suppressed += 1;
                }
            }
        }

        let ctx = &self.ctx;
        let results: Vec<(String, SendResult)> = stream::iter(due)
            .map(move |(balance, channel)| async move {
                if cancel.is_cancelled() {
                    return (balance.payer_id, SendResult::Skipped);
                }
                let params = ctx.params_for(&balance);
                let result = match ctx.dispatcher.send(&channel, TemplateKind::Reminder, &params).await {
                    Ok(_) => SendResult::Sent,
                    Err(e) => SendResult::Failed(e.to_string()),
                };
                (balance.payer_id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (payer_id, result) in results {
            match result {
                SendResult::Sent => report.notified += 1,
                SendResult::Skipped => report.skipped += 1,
                SendResult::Failed(error) => {
                    warn!(payer_id = %payer_id, error = %error, "Reminder failed");
                    report.failures.push(SweepFailure { payer_id, error });
                }
            }
        }
        report.failures.sort_by(|a, b| a.payer_id.cmp(&b.payer_id));
        report.cancelled = cancel.is_cancelled();

        info!(
            scanned = report.scanned,
            notified = report.notified,
            suppressed = report.suppressed,
            failed = report.failures.len(),
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Reminder sweep finished"
        );
        Ok(report)
    }
}
