//! Reminder checkpoint planning.
//!
//! Pure functions only: deciding whether a checkpoint is due is the engine's
//! job, so checkpoints whose fire time is already in the past stay in the plan.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use subtrack_core::renewal;

use crate::error::Result;

/// Default reminder offsets in days before renewal.
pub const DEFAULT_OFFSETS: [u32; 4] = [7, 5, 3, 1];

/// Human-readable label of a checkpoint, e.g. `"7 days before reminder"`.
///
/// Doubles as the per-run idempotency discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointLabel(String);

impl CheckpointLabel {
    /// Label for a reminder `offset_days` before renewal.
    #[must_use]
    pub fn for_offset(offset_days: u32) -> Self {
        Self(format!("{offset_days} days before reminder"))
    }

    /// Get the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One scheduled reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderCheckpoint {
    /// Days before the renewal date.
    pub offset_days: u32,
    /// Calendar day the reminder belongs to.
    pub fire_on: NaiveDate,
    /// Instant at which the reminder becomes due.
    pub fire_at: DateTime<Utc>,
    /// Display label.
    pub label: CheckpointLabel,
}

impl ReminderCheckpoint {
    /// Whether the checkpoint is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.fire_at
    }

    /// Whether firing at `now` is past the checkpoint's calendar day.
    #[must_use]
    pub fn is_late(&self, now: DateTime<Utc>) -> bool {
        now.date_naive() > self.fire_on
    }
}

/// Ordered reminder checkpoints for one renewal cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPlan {
    renewal_date: NaiveDate,
    checkpoints: Vec<ReminderCheckpoint>,
}

impl ReminderPlan {
    /// Build the plan for `renewal_date`.
    ///
    /// Checkpoints are sorted ascending by fire time (descending offset);
    /// duplicate offsets collapse into one checkpoint.
    ///
    /// # Errors
    ///
    /// Returns a date-out-of-range error when an offset reaches before the
    /// start of the calendar.
    pub fn build(renewal_date: NaiveDate, offsets: &[u32], fire_time: NaiveTime) -> Result<Self> {
        let checkpoints = offsets
            .iter()
            .copied()
            .sorted_unstable_by(|a, b| b.cmp(a))
            .dedup()
            .map(|offset_days| {
                let fire_on = renewal::sub_days(renewal_date, u64::from(offset_days))?;
                Ok(ReminderCheckpoint {
                    offset_days,
                    fire_on,
                    fire_at: fire_on.and_time(fire_time).and_utc(),
                    label: CheckpointLabel::for_offset(offset_days),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            renewal_date,
            checkpoints,
        })
    }

    /// Plan with [`DEFAULT_OFFSETS`] firing at midnight UTC.
    ///
    /// # Errors
    ///
    /// See [`ReminderPlan::build`].
    pub fn with_defaults(renewal_date: NaiveDate) -> Result<Self> {
        Self::build(renewal_date, &DEFAULT_OFFSETS, NaiveTime::MIN)
    }

    /// The renewal date this plan was built for.
    #[must_use]
    pub const fn renewal_date(&self) -> NaiveDate {
        self.renewal_date
    }

    /// All checkpoints in firing order.
    #[must_use]
    pub fn checkpoints(&self) -> &[ReminderCheckpoint] {
        &self.checkpoints
    }

    /// Checkpoint at position `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ReminderCheckpoint> {
        self.checkpoints.get(index)
    }

    /// Position of the checkpoint carrying `label`.
    #[must_use]
    pub fn position(&self, label: &CheckpointLabel) -> Option<usize> {
        self.checkpoints.iter().position(|c| &c.label == label)
    }

    /// Number of checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Whether the plan has no checkpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}
