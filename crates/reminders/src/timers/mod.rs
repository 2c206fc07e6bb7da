//! Durable timers that suspend reminder runs between checkpoints.
//!
//! A sleeping run holds no task: the engine persists its wake time and hands
//! a [`WakeRequest`] to a [`SuspendableTimer`]. The [`TimerScheduler`] keeps
//! pending timers in a min-heap backed by a [`TimerStore`], and the
//! [`TimerExecutor`] polls due timers and re-enters the run through a
//! [`TimerCallback`].
//!
//! Timers are at-least-once: a timer is only marked fired in the store after
//! its callback finished, so a crash mid-callback leaves it pending and
//! [`TimerScheduler::recover`] picks it up again on the next start.

mod executor;
mod persistence;
mod scheduler;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtrack_core::SubscriptionId;

use crate::error::Result;
use crate::plan::CheckpointLabel;
use crate::types::RunKey;

pub use executor::{ExecutionResult, LoggingCallback, TimerCallback, TimerExecutor};
pub use persistence::{InMemoryTimerStore, TimerStore};
pub use scheduler::{DurableTimer, TimerId, TimerScheduler, TimerStatus};

/// Callback id of timers that resume a reminder run.
pub const RESUME_RUN_CALLBACK: &str = "resume_run";

/// Request to resume a run at `wake_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeRequest {
    pub key: RunKey,
    pub label: CheckpointLabel,
    pub offset_days: u32,
    pub wake_at: DateTime<Utc>,
}

impl WakeRequest {
    /// Deterministic timer id for this wake-up.
    #[must_use]
    pub fn timer_id(&self) -> TimerId {
        TimerId::for_wake(&self.key, self.offset_days)
    }
}

/// Payload carried by resume timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePayload {
    pub subscription_id: SubscriptionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<CheckpointLabel>,
}

/// Durable, restart-safe sleep.
#[async_trait]
pub trait SuspendableTimer: Send + Sync {
    /// Arrange for the run to be re-entered at or after `request.wake_at`.
    ///
    /// Registering the same wake-up twice yields a single pending timer.
    async fn sleep_until(&self, request: WakeRequest) -> Result<TimerId>;
}
