//! Timer scheduling and management.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtrack_core::Clock;
use tokio::sync::RwLock;
use tracing::{debug, info};
use ulid::Ulid;
use uuid::Uuid;

use super::persistence::{InMemoryTimerStore, TimerStore};
use super::{RESUME_RUN_CALLBACK, ResumePayload, SuspendableTimer, WakeRequest};
use crate::error::Result;
use crate::types::RunKey;

/// Min-heap of (execute_at, id).
type TimerQueue = RwLock<BinaryHeap<Reverse<(DateTime<Utc>, TimerId)>>>;

/// Unique identifier for a timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(String);

impl TimerId {
    /// Create a new unique timer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("timer-{}", Uuid::new_v4()))
    }

    /// Deterministic id of the wake-up for one checkpoint of one run.
    #[must_use]
    pub fn for_wake(key: &RunKey, offset_days: u32) -> Self {
        Self(format!("wake_{}_{offset_days}", key.storage_key()))
    }

    /// Fresh id for an immediate run trigger.
    #[must_use]
    pub fn for_trigger() -> Self {
        Self(format!("run_{}", Ulid::new().to_string().to_lowercase()))
    }

    /// Create a timer ID from an existing string.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TimerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    /// Timer is waiting to fire.
    Pending,
    /// Timer fired and its callback finished.
    Fired,
    /// Timer was cancelled.
    Cancelled,
    /// Timer callback failed for good.
    Failed,
}

impl TimerStatus {
    /// Check if the timer is pending.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Check if the timer is terminal (won't change).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Fired | Self::Cancelled | Self::Failed)
    }

    /// Lowercase name, as persisted.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fired => "fired",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

/// A durable timer that persists and fires at a scheduled time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableTimer {
    id: TimerId,
    execute_at: DateTime<Utc>,
    payload: serde_json::Value,
    status: TimerStatus,
    #[serde(default)]
    callback_id: Option<String>,
    /// Retries already spent.
    #[serde(default)]
    attempts: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DurableTimer {
    /// Create a pending timer.
    #[must_use]
    pub fn new(
        id: TimerId,
        execute_at: DateTime<Utc>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            execute_at,
            payload,
            status: TimerStatus::Pending,
            callback_id: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the callback ID.
    #[must_use]
    pub fn with_callback(mut self, callback_id: impl Into<String>) -> Self {
        self.callback_id = Some(callback_id.into());
        self
    }

    /// Get the timer ID.
    #[must_use]
    pub const fn id(&self) -> &TimerId {
        &self.id
    }

    /// Get when the timer should execute.
    #[must_use]
    pub const fn execute_at(&self) -> DateTime<Utc> {
        self.execute_at
    }

    /// Get the payload.
    #[must_use]
    pub const fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Get the status.
    #[must_use]
    pub const fn status(&self) -> TimerStatus {
        self.status
    }

    /// Get the callback ID.
    #[must_use]
    pub fn callback_id(&self) -> Option<&str> {
        self.callback_id.as_deref()
    }

    /// Retries already spent.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the updated timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Check if the timer should fire at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_pending() && now >= self.execute_at
    }

    pub(crate) fn set_status(&mut self, status: TimerStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Put the timer back to pending at `execute_at`, spending one retry.
    pub fn reschedule_at(&mut self, execute_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = TimerStatus::Pending;
        self.execute_at = execute_at;
        self.attempts = self.attempts.saturating_add(1);
        self.updated_at = now;
    }
}

impl PartialEq for DurableTimer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DurableTimer {}

/// Schedules and manages durable timers.
pub struct TimerScheduler {
    store: Arc<dyn TimerStore>,
    clock: Arc<dyn Clock>,
    /// Live timers indexed by ID (pending, or fired and awaiting completion).
    timers: RwLock<HashMap<String, DurableTimer>>,
    /// Priority queue of timer IDs by execution time.
    queue: TimerQueue,
}

impl TimerScheduler {
    /// Create a scheduler over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TimerStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            timers: RwLock::new(HashMap::new()),
            queue: RwLock::new(BinaryHeap::new()),
        }
    }

    /// Create a scheduler backed by a fresh in-memory store.
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(InMemoryTimerStore::new()), clock)
    }

    /// The clock timers are compared against.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Reload pending timers from the store after a restart.
    ///
    /// Returns the number of timers restored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn recover(&self) -> Result<usize> {
        let pending = self.store.load_pending().await?;
        let mut timers = self.timers.write().await;
        let mut queue = self.queue.write().await;
        let mut restored = 0usize;

        for timer in pending {
            if timers.contains_key(timer.id().as_str()) {
                continue;
            }
            queue.push(Reverse((timer.execute_at(), timer.id().clone())));
            timers.insert(timer.id().as_str().to_string(), timer);
            restored = restored.saturating_add(1);
        }

        info!(restored, "Recovered pending timers");
        Ok(restored)
    }

    /// Schedule a timer.
    ///
    /// Scheduling an id that is already pending at the same instant is a
    /// no-op; a different instant replaces the pending timer.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn schedule(&self, timer: DurableTimer) -> Result<TimerId> {
        let timer_id = timer.id().clone();
        let execute_at = timer.execute_at();

        if let Some(existing) = self.timers.read().await.get(timer_id.as_str()) {
            if existing.status().is_pending() && existing.execute_at() == execute_at {
                debug!(timer_id = %timer_id, "Timer already scheduled");
                return Ok(timer_id);
            }
        }

        self.store.save(&timer).await?;

        self.timers
            .write()
            .await
            .insert(timer_id.as_str().to_string(), timer);
        self.queue
            .write()
            .await
            .push(Reverse((execute_at, timer_id.clone())));

        debug!(timer_id = %timer_id, execute_at = %execute_at, "Timer scheduled");
        Ok(timer_id)
    }

    /// Reschedule a fired timer after a delay.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn reschedule(&self, mut timer: DurableTimer, delay_secs: u64) -> Result<()> {
        let now = self.clock.now();
        let execute_at = i64::try_from(delay_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        timer.reschedule_at(execute_at, now);
        let timer_id = timer.id().clone();

        self.store.save(&timer).await?;

        self.timers
            .write()
            .await
            .insert(timer_id.as_str().to_string(), timer);
        self.queue
            .write()
            .await
            .push(Reverse((execute_at, timer_id)));

        Ok(())
    }

    /// Cancel a pending timer. Returns false if it was not pending.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn cancel(&self, timer_id: &TimerId) -> Result<bool> {
        let now = self.clock.now();
        let mut timers = self.timers.write().await;

        let pending = timers
            .get(timer_id.as_str())
            .is_some_and(|t| t.status().is_pending());
        if !pending {
            return Ok(false);
        }

        self.store
            .update_status(timer_id, TimerStatus::Cancelled, now)
            .await?;
        timers.remove(timer_id.as_str());
        Ok(true)
    }

    /// Get a live timer by ID.
    pub async fn get(&self, timer_id: &TimerId) -> Option<DurableTimer> {
        self.timers.read().await.get(timer_id.as_str()).cloned()
    }

    /// Poll for due timers.
    pub async fn poll_due(&self) -> Vec<DurableTimer> {
        self.poll_due_with_limit(usize::MAX).await
    }

    /// Poll for at most `limit` due timers.
    ///
    /// Returned timers are marked fired in memory only; the store keeps them
    /// pending until [`TimerScheduler::complete`] or
    /// [`TimerScheduler::fail`] is called.
    pub async fn poll_due_with_limit(&self, limit: usize) -> Vec<DurableTimer> {
        if limit == 0 {
            return Vec::new();
        }

        let now = self.clock.now();
        let mut due_timers = Vec::new();
        // Lock order matches `recover`: timers, then queue.
        let mut timers = self.timers.write().await;
        let mut queue = self.queue.write().await;

        while let Some(Reverse((execute_at, timer_id))) = queue.pop() {
            if due_timers.len() >= limit || execute_at > now {
                queue.push(Reverse((execute_at, timer_id)));
                break;
            }

            // Stale heap entries (rescheduled or cancelled timers) are dropped.
            if let Some(timer) = timers.get_mut(timer_id.as_str()) {
                if timer.is_due(now) && timer.execute_at() == execute_at {
                    timer.set_status(TimerStatus::Fired, now);
                    due_timers.push(timer.clone());
                }
            }
        }

        due_timers
    }

    /// Mark a fired timer done and forget it.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn complete(&self, timer_id: &TimerId) -> Result<()> {
        self.finish(timer_id, TimerStatus::Fired).await
    }

    /// Mark a timer failed for good and forget it.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn fail(&self, timer_id: &TimerId) -> Result<()> {
        self.finish(timer_id, TimerStatus::Failed).await
    }

    async fn finish(&self, timer_id: &TimerId, status: TimerStatus) -> Result<()> {
        let now = self.clock.now();
        {
            let mut timers = self.timers.write().await;
            // A timer re-scheduled while its callback ran stays live.
            if timers
                .get(timer_id.as_str())
                .is_some_and(|t| !t.status().is_pending())
            {
                timers.remove(timer_id.as_str());
            } else if timers.contains_key(timer_id.as_str()) {
                return Ok(());
            }
        }
        self.store.update_status(timer_id, status, now).await
    }

    /// Get the next instant a timer will fire.
    pub async fn peek_next(&self) -> Option<DateTime<Utc>> {
        self.queue
            .read()
            .await
            .peek()
            .map(|Reverse((execute_at, _))| *execute_at)
    }

    /// Get the number of pending timers.
    pub async fn pending_count(&self) -> usize {
        self.timers
            .read()
            .await
            .values()
            .filter(|t| t.status().is_pending())
            .count()
    }
}

#[async_trait]
impl SuspendableTimer for TimerScheduler {
    async fn sleep_until(&self, request: WakeRequest) -> Result<TimerId> {
        let payload = serde_json::to_value(ResumePayload {
            subscription_id: request.key.subscription_id.clone(),
            label: Some(request.label.clone()),
        })?;
        let timer = DurableTimer::new(
            request.timer_id(),
            request.wake_at,
            payload,
            self.clock.now(),
        )
        .with_callback(RESUME_RUN_CALLBACK);
        self.schedule(timer).await
    }
}
