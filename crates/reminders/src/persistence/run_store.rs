//! Run and journal persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtrack_core::SubscriptionId;
use surrealdb::sql::Thing;

use super::client::ReminderStore;
use super::error::{PersistenceResult, from_surrealdb_error, storage_error};
use crate::error::Result;
use crate::storage::RunStorage;
use crate::types::{Journal, JournalEntry, RunId, RunKey, WorkflowRun};

const RUN_TABLE: &str = "workflow_run";
const JOURNAL_TABLE: &str = "run_journal";

/// A workflow run as stored.
///
/// The run itself is kept as JSON; the other columns exist for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Thing>,
    subscription_id: String,
    renewal_date: String,
    state: String,
    run_json: String,
    updated_at: DateTime<Utc>,
}

impl RunRecord {
    fn from_run(run: &WorkflowRun) -> PersistenceResult<Self> {
        Ok(Self {
            id: None,
            subscription_id: run.key.subscription_id.as_str().to_string(),
            renewal_date: run.key.renewal_date.to_string(),
            state: run.state.to_string(),
            run_json: serde_json::to_string(run)?,
            updated_at: run.updated_at,
        })
    }

    fn into_run(self) -> PersistenceResult<WorkflowRun> {
        Ok(serde_json::from_str(&self.run_json)?)
    }
}

#[derive(Debug, Deserialize)]
struct JournalRecord {
    #[serde(default)]
    entries: Vec<String>,
}

impl ReminderStore {
    async fn upsert_run(&self, run: &WorkflowRun) -> PersistenceResult<()> {
        let record = RunRecord::from_run(run)?;
        let _: Option<RunRecord> = self
            .db()
            .upsert((RUN_TABLE, run.key.storage_key()))
            .content(record)
            .await
            .map_err(from_surrealdb_error)?;
        Ok(())
    }

    async fn select_run(&self, key: &RunKey) -> PersistenceResult<Option<WorkflowRun>> {
        let record: Option<RunRecord> = self
            .db()
            .select((RUN_TABLE, key.storage_key()))
            .await
            .map_err(from_surrealdb_error)?;
        record.map(RunRecord::into_run).transpose()
    }

    async fn select_runs(&self, subscription_id: &SubscriptionId) -> PersistenceResult<Vec<WorkflowRun>> {
        let records: Vec<RunRecord> = self
            .db()
            .query("SELECT * FROM type::table($table) WHERE subscription_id = $subscription_id ORDER BY renewal_date ASC")
            .bind(("table", RUN_TABLE))
            .bind(("subscription_id", subscription_id.as_str().to_string()))
            .await
            .map_err(from_surrealdb_error)?
            .take(0)
            .map_err(from_surrealdb_error)?;
        records.into_iter().map(RunRecord::into_run).collect()
    }

    async fn push_journal(&self, run_id: RunId, entry: &JournalEntry) -> PersistenceResult<()> {
        let entry_json = serde_json::to_string(entry)?;
        self.db()
            .query("UPSERT type::thing($table, $id) SET entries = array::append(entries ?? [], $entry)")
            .bind(("table", JOURNAL_TABLE))
            .bind(("id", run_id.to_string()))
            .bind(("entry", entry_json))
            .await
            .map_err(from_surrealdb_error)?
            .check()
            .map_err(from_surrealdb_error)?;
        Ok(())
    }

    async fn select_journal(&self, run_id: RunId) -> PersistenceResult<Journal> {
        let record: Option<JournalRecord> = self
            .db()
            .select((JOURNAL_TABLE, run_id.to_string()))
            .await
            .map_err(from_surrealdb_error)?;

        record
            .map(|r| r.entries)
            .unwrap_or_default()
            .iter()
            .map(|raw| serde_json::from_str::<JournalEntry>(raw).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl RunStorage for ReminderStore {
    async fn save_run(&self, run: &WorkflowRun) -> Result<()> {
        self.upsert_run(run).await.map_err(storage_error("save_run"))
    }

    async fn load_run(&self, key: &RunKey) -> Result<Option<WorkflowRun>> {
        self.select_run(key).await.map_err(storage_error("load_run"))
    }

    async fn list_runs(&self, subscription_id: &SubscriptionId) -> Result<Vec<WorkflowRun>> {
        self.select_runs(subscription_id)
            .await
            .map_err(storage_error("list_runs"))
    }

    async fn append_journal(&self, run_id: RunId, entry: JournalEntry) -> Result<()> {
        self.push_journal(run_id, &entry)
            .await
            .map_err(storage_error("append_journal"))
    }

    async fn load_journal(&self, run_id: RunId) -> Result<Journal> {
        self.select_journal(run_id)
            .await
            .map_err(storage_error("load_journal"))
    }
}
