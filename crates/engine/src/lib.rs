//! Accrual checks and reminder sweeps.
//!
//! Both operations work against trait objects from `rentwatch-store` and
//! `rentwatch-notify`, bundled in an [`EngineContext`].

pub mod check;
pub mod context;
pub mod sweep;

pub use check::{AccrualCheck, CheckError, CheckOutcome, InputError, NoticeStatus, ACCRUAL_NOTE};
pub use context::EngineContext;
pub use sweep::{ReminderScanner, SweepError, SweepFailure, SweepReport};
