//! Notice and reminder thresholds.
//!
//! Two kinds of message go out. The initial notice follows an accrual check
//! that just posted a charge; the reminder comes from a periodic sweep that
//! posts nothing. Both ignore payers whose debt is within the forgiveness
//! margin, and reminders are additionally held back until a full gate period
//! (one day by default) has passed since the payer's last ledger activity.

use serde::Serialize;

use crate::accrual::SECONDS_IN_DAY;
use crate::ledger::AggregatedBalance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Initial,
    Reminder,
}

/// Why a notice was (or was not) sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Notify,
    /// Balance is zero or positive.
    InCredit,
    /// Debt does not exceed the forgiveness margin.
    WithinMargin,
    /// Reminder gate has not elapsed since the last entry.
    RecentActivity,
}

impl Decision {
    pub fn is_notify(self) -> bool {
        matches!(self, Decision::Notify)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    /// Forgiveness margin in minor units.
    pub margin: i64,
    /// Minimum seconds between the last ledger entry and a reminder.
    pub reminder_gate_secs: i64,
}

impl ThresholdPolicy {
    pub fn new(margin: i64) -> Self {
        Self {
            margin,
            reminder_gate_secs: SECONDS_IN_DAY,
        }
    }

    pub fn with_reminder_gate(mut self, secs: i64) -> Self {
        self.reminder_gate_secs = secs;
        self
    }

    pub fn should_notify(&self, balance: &AggregatedBalance, now: i64, kind: NoticeKind) -> bool {
        self.decide(balance, now, kind).is_notify()
    }

    pub fn decide(&self, balance: &AggregatedBalance, now: i64, kind: NoticeKind) -> Decision {
        if balance.balance >= 0 {
            return Decision::InCredit;
        }
        let owed = balance.owed();

        match kind {
            NoticeKind::Initial => {
                if owed > self.margin {
                    Decision::Notify
                } else {
                    Decision::WithinMargin
                }
            }
            NoticeKind::Reminder => {
                if owed < self.margin {
                    Decision::WithinMargin
                } else if now.saturating_sub(balance.most_recent_entry_at) < self.reminder_gate_secs {
                    Decision::RecentActivity
                } else {
                    Decision::Notify
                }
            }
        }
    }
}
