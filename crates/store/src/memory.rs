//! In-process ledger.
//!
//! Same contract as the PostgreSQL store, backed by a vector behind a tokio
//! mutex. Used by tests and by `--memory` runs. The lock is held across
//! append + aggregate in [`record_charge`](LedgerStore::record_charge), which
//! gives the same read-after-write guarantee as the SQL transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use rentwatch_core::{AggregatedBalance, LedgerEntry, PayerProfile};

use crate::error::StoreError;
use crate::ledger::LedgerStore;

#[derive(Default)]
struct MemoryState {
    entries: Vec<LedgerEntry>,
    payers: HashMap<String, PayerProfile>,
}

impl MemoryState {
    fn fold<'a>(&self, entries: impl Iterator<Item = &'a LedgerEntry>) -> Vec<AggregatedBalance> {
        // payer_id → (sum, latest occurred_at)
        let mut sums: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
        for entry in entries {
            let slot = sums.entry(entry.payer_id.as_str()).or_insert((0, i64::MIN));
            slot.0 = slot.0.saturating_add(entry.amount);
            slot.1 = slot.1.max(entry.occurred_at);
        }

        let mut balances: Vec<AggregatedBalance> = sums
            .into_iter()
            .map(|(payer_id, (balance, latest))| {
                let profile = self.payers.get(payer_id);
                AggregatedBalance {
                    payer_id: payer_id.to_string(),
                    display_name: profile
                        .map(|p| p.display_name.clone())
                        .unwrap_or_else(|| payer_id.to_string()),
                    balance,
                    notify_channel: profile.map(|p| p.notify_channel.clone()),
                    most_recent_entry_at: latest,
                }
            })
            .collect();

        balances.sort_by(|a, b| {
            a.most_recent_entry_at
                .cmp(&b.most_recent_entry_at)
                .then_with(|| a.payer_id.cmp(&b.payer_id))
        });
        balances
    }

    fn aggregate_for(&self, payer_id: &str) -> Result<AggregatedBalance, StoreError> {
        self.fold(self.entries.iter().filter(|e| e.payer_id == payer_id))
            .pop()
            .ok_or_else(|| StoreError::NotFound(payer_id.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Total number of entries across all payers.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory ledger marked unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.check_available()?;
        self.state.lock().await.entries.push(entry.clone());
        Ok(())
    }

    async fn aggregate_for(&self, payer_id: &str) -> Result<AggregatedBalance, StoreError> {
        self.check_available()?;
        self.state.lock().await.aggregate_for(payer_id)
    }

    async fn aggregate_all(&self) -> Result<Vec<AggregatedBalance>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.fold(state.entries.iter()))
    }

    async fn upsert_payer(&self, profile: &PayerProfile) -> Result<(), StoreError> {
        self.check_available()?;
        self.state
            .lock()
            .await
            .payers
            .insert(profile.payer_id.clone(), profile.clone());
        Ok(())
    }

    async fn record_charge(&self, entry: &LedgerEntry) -> Result<AggregatedBalance, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.entries.push(entry.clone());
        state.aggregate_for(&entry.payer_id)
    }

    async fn entries_for(&self, payer_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.payer_id == payer_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
