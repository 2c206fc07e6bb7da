//! Reminder delivery contract and stock implementations.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use subtrack_core::{OwnerContact, Subscription};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::plan::CheckpointLabel;

/// Everything a notifier needs to deliver one reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderNotice {
    pub recipient: OwnerContact,
    pub label: CheckpointLabel,
    pub days_before: u32,
    pub subscription: Subscription,
    /// Stable per (subscription, renewal cycle, label).
    pub idempotency_key: Uuid,
    /// Delivered after the reminder's calendar day.
    pub late: bool,
}

/// Delivers reminders (email, SMS, push, ...).
///
/// Implementations should treat a repeated `idempotency_key` as already
/// delivered. Errors are logged by the engine and never stop a run.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one reminder.
    async fn send(&self, notice: &ReminderNotice) -> Result<()>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, notice: &ReminderNotice) -> Result<()> {
        info!(
            to = %notice.recipient.email,
            subscription_id = %notice.subscription.id,
            label = %notice.label,
            late = notice.late,
            key = %notice.idempotency_key,
            "Reminder sent"
        );
        Ok(())
    }
}

/// In-memory notifier that records deliveries (for testing).
///
/// Repeated idempotency keys are acknowledged without being recorded again.
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    inner: Arc<RwLock<RecordingState>>,
}

#[derive(Debug, Default)]
struct RecordingState {
    delivered: Vec<ReminderNotice>,
    seen: HashSet<Uuid>,
    attempts: usize,
    failing: bool,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `send` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .failing = failing;
    }

    /// Delivered notices, in delivery order.
    #[must_use]
    pub fn delivered(&self) -> Vec<ReminderNotice> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .delivered
            .clone()
    }

    /// Labels of delivered notices, in delivery order.
    #[must_use]
    pub fn delivered_labels(&self) -> Vec<String> {
        self.delivered()
            .into_iter()
            .map(|n| n.label.as_str().to_string())
            .collect()
    }

    /// Number of `send` calls, including duplicates and failures.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .attempts
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notice: &ReminderNotice) -> Result<()> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.attempts = state.attempts.saturating_add(1);
        if state.failing {
            return Err(Error::notifier_failed(
                notice.label.as_str(),
                "mail transport unavailable",
            ));
        }
        if state.seen.insert(notice.idempotency_key) {
            state.delivered.push(notice.clone());
        }
        Ok(())
    }
}
