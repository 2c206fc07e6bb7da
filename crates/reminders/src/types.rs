//! Core types for reminder workflow runs.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use subtrack_core::SubscriptionId;
use ulid::Ulid;
use uuid::Uuid;

use crate::plan::CheckpointLabel;

/// Unique identifier for a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    /// Create a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Create from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Get the inner ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a run: one subscription, one renewal cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey {
    pub subscription_id: SubscriptionId,
    pub renewal_date: NaiveDate,
}

impl RunKey {
    /// Create a run key.
    #[must_use]
    pub const fn new(subscription_id: SubscriptionId, renewal_date: NaiveDate) -> Self {
        Self {
            subscription_id,
            renewal_date,
        }
    }

    /// Flat string form used as a storage record id.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.subscription_id, self.renewal_date)
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.subscription_id, self.renewal_date)
    }
}

/// Run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, no checkpoint evaluated yet.
    AwaitingStart,
    /// Suspended until `wake_at`.
    Sleeping,
    /// Awake and checking whether the next checkpoint may fire.
    Evaluating,
    /// Every checkpoint was processed.
    Completed,
    /// Stopped early; see the run's abort reason.
    Aborted,
}

impl RunState {
    /// Check if the run is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Check if the run can transition to the given state.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::AwaitingStart | Self::Sleeping | Self::Evaluating,
                Self::Sleeping | Self::Evaluating | Self::Completed | Self::Aborted
            )
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingStart => "awaiting_start",
            Self::Sleeping => "sleeping",
            Self::Evaluating => "evaluating",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// Why a run stopped before processing every checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The subscription no longer exists.
    SubscriptionMissing,
    /// The subscription is canceled or expired.
    NotActive,
    /// The renewal date is behind today.
    RenewalPassed,
    /// The subscription moved to another renewal date; the new cycle gets
    /// its own run.
    RenewalChanged,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SubscriptionMissing => "subscription missing",
            Self::NotActive => "subscription not active",
            Self::RenewalPassed => "renewal date passed",
            Self::RenewalChanged => "renewal date changed",
        };
        write!(f, "{s}")
    }
}

/// A processed checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub label: CheckpointLabel,
    pub offset_days: u32,
    pub idempotency_key: Uuid,
    pub fire_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    /// False when the notifier reported a failure.
    pub delivered: bool,
    /// Fired after its calendar day.
    pub late: bool,
}

/// Durable progress of one reminder run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: RunId,
    pub key: RunKey,
    /// Index of the next checkpoint to process.
    pub cursor: usize,
    pub checkpoints: Vec<CheckpointRecord>,
    pub state: RunState,
    #[serde(default)]
    pub wake_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub abort_reason: Option<AbortReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Create a fresh run for `key`.
    #[must_use]
    pub fn new(key: RunKey, now: DateTime<Utc>) -> Self {
        Self {
            run_id: RunId::new(),
            key,
            cursor: 0,
            checkpoints: Vec::new(),
            state: RunState::AwaitingStart,
            wake_at: None,
            abort_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the checkpoint labelled `label` was already processed.
    #[must_use]
    pub fn has_processed(&self, label: &CheckpointLabel) -> bool {
        self.checkpoints.iter().any(|c| &c.label == label)
    }

    /// Record a processed checkpoint and move the cursor past it.
    pub fn record(&mut self, record: CheckpointRecord) {
        self.updated_at = record.processed_at;
        self.checkpoints.push(record);
        self.advance();
    }

    /// Move the cursor to the next checkpoint.
    pub fn advance(&mut self) {
        self.cursor = self.cursor.saturating_add(1);
    }

    /// Labels processed so far, in firing order.
    #[must_use]
    pub fn processed_labels(&self) -> Vec<&str> {
        self.checkpoints.iter().map(|c| c.label.as_str()).collect_vec()
    }

    /// Outcome represented by a terminal run, if any.
    #[must_use]
    pub fn terminal_outcome(&self) -> Option<RunOutcome> {
        match self.state {
            RunState::Completed => Some(RunOutcome::Completed),
            RunState::Aborted => Some(RunOutcome::Aborted {
                reason: self.abort_reason.unwrap_or(AbortReason::SubscriptionMissing),
            }),
            RunState::AwaitingStart | RunState::Sleeping | RunState::Evaluating => None,
        }
    }
}

/// Journal entry for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    /// A run was created.
    RunStarted {
        key: RunKey,
        timestamp: DateTime<Utc>,
    },
    /// Run state changed.
    StateChanged {
        from: RunState,
        to: RunState,
        timestamp: DateTime<Utc>,
    },
    /// A durable wake-up was registered.
    SleepScheduled {
        label: CheckpointLabel,
        wake_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    /// A checkpoint fired.
    CheckpointFired {
        label: CheckpointLabel,
        late: bool,
        timestamp: DateTime<Utc>,
    },
    /// The notifier failed; the run went on.
    NotifierFailed {
        label: CheckpointLabel,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The run stopped early.
    RunAborted {
        reason: AbortReason,
        timestamp: DateTime<Utc>,
    },
}

impl JournalEntry {
    pub fn run_started(key: RunKey, timestamp: DateTime<Utc>) -> Self {
        Self::RunStarted { key, timestamp }
    }

    pub fn state_changed(from: RunState, to: RunState, timestamp: DateTime<Utc>) -> Self {
        Self::StateChanged {
            from,
            to,
            timestamp,
        }
    }

    pub fn sleep_scheduled(
        label: CheckpointLabel,
        wake_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::SleepScheduled {
            label,
            wake_at,
            timestamp,
        }
    }

    pub fn checkpoint_fired(label: CheckpointLabel, late: bool, timestamp: DateTime<Utc>) -> Self {
        Self::CheckpointFired {
            label,
            late,
            timestamp,
        }
    }

    pub fn notifier_failed(
        label: CheckpointLabel,
        error: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::NotifierFailed {
            label,
            error: error.into(),
            timestamp,
        }
    }

    pub fn run_aborted(reason: AbortReason, timestamp: DateTime<Utc>) -> Self {
        Self::RunAborted { reason, timestamp }
    }

    /// Get the timestamp of this entry.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RunStarted { timestamp, .. }
            | Self::StateChanged { timestamp, .. }
            | Self::SleepScheduled { timestamp, .. }
            | Self::CheckpointFired { timestamp, .. }
            | Self::NotifierFailed { timestamp, .. }
            | Self::RunAborted { timestamp, .. } => *timestamp,
        }
    }
}

/// Journal of a run, in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// Create a new empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the journal.
    pub fn append(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    /// Get all entries.
    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Labels of every fired checkpoint.
    #[must_use]
    pub fn fired_labels(&self) -> Vec<&CheckpointLabel> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                JournalEntry::CheckpointFired { label, .. } => Some(label),
                _ => None,
            })
            .collect_vec()
    }

    /// Get the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the journal is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<JournalEntry> for Journal {
    fn from_iter<I: IntoIterator<Item = JournalEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// How a single `run` invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Waiting on a durable timer.
    Suspended { wake_at: DateTime<Utc> },
    /// All checkpoints processed.
    Completed,
    /// Stopped early.
    Aborted { reason: AbortReason },
}

impl RunOutcome {
    /// Whether the run will not advance any further.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Suspended { .. })
    }
}

/// Summary of a single `run` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub subscription_id: SubscriptionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<NaiveDate>,
    pub outcome: RunOutcome,
    /// Labels fired during this invocation.
    pub fired: Vec<CheckpointLabel>,
}

impl RunReport {
    /// Report for an invocation that never reached a run record.
    #[must_use]
    pub const fn aborted(subscription_id: SubscriptionId, reason: AbortReason) -> Self {
        Self {
            subscription_id,
            run_id: None,
            renewal_date: None,
            outcome: RunOutcome::Aborted { reason },
            fired: Vec::new(),
        }
    }
}
