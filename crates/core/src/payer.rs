//! Payer identity records.
//!
//! One record per tenant, owned by the identity store. The accrual check reads
//! it, charges the time elapsed since `last_paid_at`, then writes it back with
//! `last_paid_at` moved forward.
//!
//! Records written by the older notice bot use different key names and store
//! ids as JSON numbers; both spellings are accepted on read.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::ledger::PayerProfile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerRecord {
    #[serde(alias = "user_id", deserialize_with = "string_or_number")]
    pub payer_id: String,
    #[serde(alias = "channel_id", deserialize_with = "string_or_number")]
    pub notify_channel: String,
    #[serde(alias = "email", default)]
    pub notify_email: String,
    #[serde(alias = "weekly_rent_amt")]
    pub weekly_rate: i64,
    #[serde(alias = "unix_time_last_paid")]
    pub last_paid_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayerValidationError {
    #[error("payer_id must not be empty")]
    EmptyPayerId,
    #[error("notify_channel must not be empty")]
    EmptyChannel,
    #[error("weekly_rate must be positive, got {0}")]
    NonPositiveRate(i64),
    #[error("last_paid_at must not be negative, got {0}")]
    NegativeTimestamp(i64),
}

impl PayerRecord {
    pub fn validate(&self) -> Result<(), PayerValidationError> {
        if self.payer_id.trim().is_empty() {
            return Err(PayerValidationError::EmptyPayerId);
        }
        if self.notify_channel.trim().is_empty() {
            return Err(PayerValidationError::EmptyChannel);
        }
        if self.weekly_rate <= 0 {
            return Err(PayerValidationError::NonPositiveRate(self.weekly_rate));
        }
        if self.last_paid_at < 0 {
            return Err(PayerValidationError::NegativeTimestamp(self.last_paid_at));
        }
        Ok(())
    }

    /// Name used in messages and logs: explicit name, then e-mail, then id.
    pub fn display_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ if !self.notify_email.is_empty() => self.notify_email.as_str(),
            _ => self.payer_id.as_str(),
        }
    }

    /// Directory row mirrored into the ledger database.
    pub fn profile(&self) -> PayerProfile {
        PayerProfile {
            payer_id: self.payer_id.clone(),
            display_name: self.display_name().to_string(),
            notify_channel: self.notify_channel.clone(),
        }
    }
}

/// Accept `"123"` and `123` alike; snowflake-style ids are often numeric.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Unsigned(n) => n.to_string(),
        Raw::Signed(n) => n.to_string(),
    })
}
