//! Pro-rata rent accrual.
//!
//! Rent is quoted per week but charged per elapsed second: the weekly rate is
//! spread over seven days and multiplied by the (fractional) number of days
//! since the payer was last charged. The result is truncated to whole minor
//! units, so a payer is never charged for a fraction of a cent.
//!
//! `rate / 7 * elapsed / 86400` is evaluated as one exact rational in `i128`
//! rather than in `f64`: floating point lands just below the integer for
//! rates such as 61 (`61.0 / 7.0 * 7.0 == 60.99..`), which would shave a
//! cent off a whole week.

use thiserror::Error;

pub const DAYS_IN_WEEK: i64 = 7;
pub const SECONDS_IN_DAY: i64 = 60 * 60 * 24;

/// Reasons an accrual cannot be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccrualError {
    #[error("weekly rate must be positive, got {0}")]
    NonPositiveRate(i64),

    #[error("clock went backwards: now={now} is before last_paid_at={last_paid_at}")]
    ClockWentBackwards { last_paid_at: i64, now: i64 },
}

/// Amount (minor units) newly owed between `last_paid_at` and `now`.
///
/// Neither the daily rate nor the elapsed days are truncated before they are
/// multiplied, so short periods still accrue their share instead of being
/// rounded down to whole days.
pub fn accrue(weekly_rate: i64, last_paid_at: i64, now: i64) -> Result<i64, AccrualError> {
    if weekly_rate <= 0 {
        return Err(AccrualError::NonPositiveRate(weekly_rate));
    }
    if now < last_paid_at {
        return Err(AccrualError::ClockWentBackwards { last_paid_at, now });
    }

    let elapsed = i128::from(now) - i128::from(last_paid_at);
    let owed = i128::from(weekly_rate) * elapsed / i128::from(DAYS_IN_WEEK * SECONDS_IN_DAY);
    Ok(i64::try_from(owed).unwrap_or(i64::MAX))
}
