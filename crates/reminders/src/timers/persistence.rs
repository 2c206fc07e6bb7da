//! Timer persistence for durability.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use tokio::sync::RwLock;

use super::scheduler::{DurableTimer, TimerId, TimerStatus};
use crate::error::Result;

/// Backing store for durable timers.
#[async_trait]
pub trait TimerStore: Send + Sync {
    /// Insert or replace a timer.
    async fn save(&self, timer: &DurableTimer) -> Result<()>;

    /// Update a timer's status. Unknown ids are ignored.
    async fn update_status(
        &self,
        timer_id: &TimerId,
        status: TimerStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Load a timer by ID.
    async fn load(&self, timer_id: &TimerId) -> Result<Option<DurableTimer>>;

    /// All pending timers, earliest first.
    async fn load_pending(&self) -> Result<Vec<DurableTimer>>;

    /// Delete a timer. Returns whether it existed.
    async fn delete(&self, timer_id: &TimerId) -> Result<bool>;
}

/// In-memory timer store.
///
/// Share one instance between two schedulers to simulate a restart.
#[derive(Debug, Default)]
pub struct InMemoryTimerStore {
    timers: RwLock<HashMap<TimerId, DurableTimer>>,
}

impl InMemoryTimerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TimerStore for InMemoryTimerStore {
    async fn save(&self, timer: &DurableTimer) -> Result<()> {
        self.timers
            .write()
            .await
            .insert(timer.id().clone(), timer.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        timer_id: &TimerId,
        status: TimerStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(timer) = self.timers.write().await.get_mut(timer_id) {
            timer.set_status(status, at);
        }
        Ok(())
    }

    async fn load(&self, timer_id: &TimerId) -> Result<Option<DurableTimer>> {
        Ok(self.timers.read().await.get(timer_id).cloned())
    }

    async fn load_pending(&self) -> Result<Vec<DurableTimer>> {
        Ok(self
            .timers
            .read()
            .await
            .values()
            .filter(|t| t.status().is_pending())
            .cloned()
            .sorted_by_key(DurableTimer::execute_at)
            .collect_vec())
    }

    async fn delete(&self, timer_id: &TimerId) -> Result<bool> {
        Ok(self.timers.write().await.remove(timer_id).is_some())
    }
}
