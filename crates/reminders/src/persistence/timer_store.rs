//! Durable timer persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use super::client::ReminderStore;
use super::error::{PersistenceResult, from_surrealdb_error, storage_error};
use crate::error::Result;
use crate::timers::{DurableTimer, TimerId, TimerStatus, TimerStore};

const TIMER_TABLE: &str = "durable_timer";

/// A durable timer as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TimerRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Thing>,
    status: TimerStatus,
    /// Milliseconds since the epoch, for ordering.
    execute_at_ms: i64,
    timer_json: String,
}

impl TimerRecord {
    fn from_timer(timer: &DurableTimer) -> PersistenceResult<Self> {
        Ok(Self {
            id: None,
            status: timer.status(),
            execute_at_ms: timer.execute_at().timestamp_millis(),
            timer_json: serde_json::to_string(timer)?,
        })
    }

    fn into_timer(self) -> PersistenceResult<DurableTimer> {
        Ok(serde_json::from_str(&self.timer_json)?)
    }
}

impl ReminderStore {
    async fn upsert_timer(&self, timer: &DurableTimer) -> PersistenceResult<()> {
        let record = TimerRecord::from_timer(timer)?;
        let _: Option<TimerRecord> = self
            .db()
            .upsert((TIMER_TABLE, timer.id().as_str()))
            .content(record)
            .await
            .map_err(from_surrealdb_error)?;
        Ok(())
    }

    async fn select_timer(&self, timer_id: &TimerId) -> PersistenceResult<Option<DurableTimer>> {
        let record: Option<TimerRecord> = self
            .db()
            .select((TIMER_TABLE, timer_id.as_str()))
            .await
            .map_err(from_surrealdb_error)?;
        record.map(TimerRecord::into_timer).transpose()
    }

    async fn select_pending_timers(&self) -> PersistenceResult<Vec<DurableTimer>> {
        let records: Vec<TimerRecord> = self
            .db()
            .query("SELECT * FROM type::table($table) WHERE status = $status ORDER BY execute_at_ms ASC")
            .bind(("table", TIMER_TABLE))
            .bind(("status", TimerStatus::Pending.as_str()))
            .await
            .map_err(from_surrealdb_error)?
            .take(0)
            .map_err(from_surrealdb_error)?;
        records.into_iter().map(TimerRecord::into_timer).collect()
    }

    async fn delete_timer(&self, timer_id: &TimerId) -> PersistenceResult<bool> {
        let deleted: Option<TimerRecord> = self
            .db()
            .delete((TIMER_TABLE, timer_id.as_str()))
            .await
            .map_err(from_surrealdb_error)?;
        Ok(deleted.is_some())
    }
}

#[async_trait]
impl TimerStore for ReminderStore {
    async fn save(&self, timer: &DurableTimer) -> Result<()> {
        self.upsert_timer(timer)
            .await
            .map_err(storage_error("save_timer"))
    }

    async fn update_status(
        &self,
        timer_id: &TimerId,
        status: TimerStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let Some(mut timer) = self
            .select_timer(timer_id)
            .await
            .map_err(storage_error("update_timer_status"))?
        else {
            return Ok(());
        };
        timer.set_status(status, at);
        self.upsert_timer(&timer)
            .await
            .map_err(storage_error("update_timer_status"))
    }

    async fn load(&self, timer_id: &TimerId) -> Result<Option<DurableTimer>> {
        self.select_timer(timer_id)
            .await
            .map_err(storage_error("load_timer"))
    }

    async fn load_pending(&self) -> Result<Vec<DurableTimer>> {
        self.select_pending_timers()
            .await
            .map_err(storage_error("load_pending_timers"))
    }

    async fn delete(&self, timer_id: &TimerId) -> Result<bool> {
        self.delete_timer(timer_id)
            .await
            .map_err(storage_error("delete_timer"))
    }
}
