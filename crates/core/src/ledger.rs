//! Ledger records shared by the store, policy and engine crates.

use serde::{Deserialize, Serialize};

/// One immutable signed movement on a payer's running balance.
///
/// Negative amounts are charges (the payer owes more), positive amounts are
/// payments. Amounts are minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub payer_id: String,
    pub amount: i64,
    pub occurred_at: i64,
    #[serde(default)]
    pub note: String,
}

impl LedgerEntry {
    /// A rent charge for `owed` minor units. Stored with a negative sign.
    pub fn charge(payer_id: impl Into<String>, owed: i64, occurred_at: i64, note: impl Into<String>) -> Self {
        Self {
            payer_id: payer_id.into(),
            amount: -owed,
            occurred_at,
            note: note.into(),
        }
    }

    /// A payment crediting `paid` minor units.
    pub fn payment(payer_id: impl Into<String>, paid: i64, occurred_at: i64, note: impl Into<String>) -> Self {
        Self {
            payer_id: payer_id.into(),
            amount: paid,
            occurred_at,
            note: note.into(),
        }
    }
}

/// Per-payer fold of the ledger, joined with the payer directory.
///
/// Never stored: recomputed from the entries on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedBalance {
    pub payer_id: String,
    pub display_name: String,
    /// Sum of every entry for this payer. Negative means the payer owes.
    pub balance: i64,
    /// `None` when the payer has ledger rows but no directory entry.
    pub notify_channel: Option<String>,
    pub most_recent_entry_at: i64,
}

impl AggregatedBalance {
    /// Amount owed in minor units, zero when the payer is square or in credit.
    pub fn owed(&self) -> i64 {
        if self.balance < 0 {
            self.balance.saturating_neg()
        } else {
            0
        }
    }
}

/// Directory row describing who a payer is and where to reach them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerProfile {
    pub payer_id: String,
    pub display_name: String,
    pub notify_channel: String,
}

/// Render minor units as a major-unit decimal string (`-26050` → `-260.50`).
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
