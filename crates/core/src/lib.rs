//! Domain types and pure rules for rent tracking.
//!
//! - [`accrual`]: pro-rata weekly rent calculation
//! - [`ledger`]: ledger entries and aggregated balances
//! - [`payer`]: payer identity records
//! - [`policy`]: notice and reminder thresholds
//! - [`config`]: environment-driven configuration

pub mod accrual;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod payer;
pub mod policy;

pub use accrual::{accrue, AccrualError};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::*;
pub use ledger::*;
pub use payer::{PayerRecord, PayerValidationError};
pub use policy::{Decision, NoticeKind, ThresholdPolicy};
