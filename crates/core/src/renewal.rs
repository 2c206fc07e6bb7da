//! Renewal date arithmetic and status derivation.

use chrono::{DateTime, Days, NaiveDate, Utc};

use crate::error::Error;
use crate::result::Result;
use crate::subscription::{Frequency, SubscriptionStatus};

/// `date + days`, failing instead of overflowing.
///
/// # Errors
///
/// Returns [`Error::DateOutOfRange`] when the result is not representable.
pub fn add_days(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_add_days(Days::new(days))
        .ok_or_else(|| Error::date_out_of_range(format!("{date} + {days} days")))
}

/// `date - days`, failing instead of underflowing.
///
/// # Errors
///
/// Returns [`Error::DateOutOfRange`] when the result is not representable.
pub fn sub_days(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_sub_days(Days::new(days))
        .ok_or_else(|| Error::date_out_of_range(format!("{date} - {days} days")))
}

/// Renewal date one billing period after `start`.
///
/// # Errors
///
/// Returns [`Error::InvalidFrequency`] for an unrecognised frequency and
/// [`Error::DateOutOfRange`] on calendar overflow.
pub fn compute_renewal_date(start: NaiveDate, frequency: &str) -> Result<NaiveDate> {
    frequency.parse::<Frequency>()?.renewal_after(start)
}

/// Status of a subscription renewing on `renewal` as observed at `now`.
///
/// A renewal date strictly before today (UTC) forces `Expired`; otherwise the
/// stored status is kept.
#[must_use]
pub fn compute_status(
    renewal: NaiveDate,
    now: DateTime<Utc>,
    current: SubscriptionStatus,
) -> SubscriptionStatus {
    if renewal < now.date_naive() {
        SubscriptionStatus::Expired
    } else {
        current
    }
}
