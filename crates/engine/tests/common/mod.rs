#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use rentwatch_core::config::NoticeConfig;
use rentwatch_core::{AggregatedBalance, FixedClock, LedgerEntry, PayerProfile, PayerRecord, ThresholdPolicy};
use rentwatch_engine::EngineContext;
use rentwatch_notify::{Dispatcher, Notifier, NotifyError, RetryPolicy, TemplateRenderer};
use rentwatch_store::{LedgerStore, MemoryIdentityStore, MemoryLedgerStore, StoreError};

pub const T0: i64 = 1_756_121_352;
pub const WEEK: i64 = 604_800;
pub const DAY: i64 = 86_400;

/// Records every message; channels in `failing` always error.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub calls: AtomicUsize,
    failing: HashSet<String>,
    latency: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    cancel_on_send: Option<CancellationToken>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, channel: &str) -> Self {
        self.failing.insert(channel.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_send = Some(token);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_send {
            token.cancel();
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(channel) {
            return Err(NotifyError::Api {
                status: 500,
                message: "channel unavailable".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

pub struct Harness {
    pub ledger: Arc<MemoryLedgerStore>,
    pub identities: Arc<MemoryIdentityStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    pub ctx: EngineContext,
}

pub fn notice_config(margin: i64) -> NoticeConfig {
    NoticeConfig {
        account: "1234 5678".into(),
        bsb: "062-000".into(),
        contact_user_id: "99".into(),
        margin,
        reminder_gate_secs: DAY,
    }
}

pub fn harness(notifier: RecordingNotifier, margin: i64) -> Harness {
    harness_with_ledger(notifier, margin, Arc::new(MemoryLedgerStore::new()))
}

pub fn harness_with_ledger(
    notifier: RecordingNotifier,
    margin: i64,
    ledger: Arc<MemoryLedgerStore>,
) -> Harness {
    let identities = Arc::new(MemoryIdentityStore::new());
    let notifier = Arc::new(notifier);
    let clock = Arc::new(FixedClock::new(T0));
    let notice = notice_config(margin);
    let dispatcher = Dispatcher::new(
        notifier.clone(),
        TemplateRenderer::new().unwrap(),
        RetryPolicy::default(),
    );

    let ctx = EngineContext {
        ledger: ledger.clone(),
        identities: identities.clone(),
        dispatcher: Arc::new(dispatcher),
        clock: clock.clone(),
        policy: ThresholdPolicy::new(notice.margin).with_reminder_gate(notice.reminder_gate_secs),
        notice: Arc::new(notice),
        storage_timeout: Duration::from_secs(10),
    };

    Harness {
        ledger,
        identities,
        notifier,
        clock,
        ctx,
    }
}

pub fn record(payer_id: &str, channel: &str, weekly_rate: i64, last_paid_at: i64) -> PayerRecord {
    PayerRecord {
        payer_id: payer_id.into(),
        notify_channel: channel.into(),
        notify_email: format!("{payer_id}@example.com"),
        weekly_rate,
        last_paid_at,
        display_name: None,
    }
}

/// Seed a payer with one charge at `at`.
pub async fn seed_debt(ledger: &MemoryLedgerStore, payer_id: &str, channel: &str, owed: i64, at: i64) {
    ledger
        .upsert_payer(&PayerProfile {
            payer_id: payer_id.into(),
            display_name: payer_id.into(),
            notify_channel: channel.into(),
        })
        .await
        .unwrap();
    ledger
        .append(&LedgerEntry::charge(payer_id, owed, at, "seed"))
        .await
        .unwrap();
}

/// Wraps a memory ledger and stalls `record_charge` for `stall`. With
/// `lands` set the entry is written before the stall (the commit landed but
/// the acknowledgement is slow); otherwise the stall comes first and nothing
/// is written if the call is abandoned.
pub struct StallingLedger {
    pub inner: Arc<MemoryLedgerStore>,
    pub stall: Duration,
    pub lands: bool,
}

#[async_trait::async_trait]
impl LedgerStore for StallingLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.inner.append(entry).await
    }

    async fn aggregate_for(&self, payer_id: &str) -> Result<AggregatedBalance, StoreError> {
        self.inner.aggregate_for(payer_id).await
    }

    async fn aggregate_all(&self) -> Result<Vec<AggregatedBalance>, StoreError> {
        self.inner.aggregate_all().await
    }

    async fn upsert_payer(&self, profile: &PayerProfile) -> Result<(), StoreError> {
        self.inner.upsert_payer(profile).await
    }

    async fn record_charge(&self, entry: &LedgerEntry) -> Result<AggregatedBalance, StoreError> {
        if self.lands {
            let balance = self.inner.record_charge(entry).await?;
            tokio::time::sleep(self.stall).await;
            Ok(balance)
        } else {
            tokio::time::sleep(self.stall).await;
            self.inner.record_charge(entry).await
        }
    }

    async fn entries_for(&self, payer_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.entries_for(payer_id).await
    }

    fn backend_name(&self) -> &str {
        "stalling"
    }
}
