//! Storage traits for run persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use itertools::Itertools;
use subtrack_core::SubscriptionId;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{Journal, JournalEntry, RunId, RunKey, WorkflowRun};

/// Trait for run storage backends.
#[async_trait]
pub trait RunStorage: Send + Sync {
    /// Save (insert or replace) a run.
    async fn save_run(&self, run: &WorkflowRun) -> Result<()>;

    /// Load a run by key.
    async fn load_run(&self, key: &RunKey) -> Result<Option<WorkflowRun>>;

    /// All runs of a subscription, oldest cycle first.
    async fn list_runs(&self, subscription_id: &SubscriptionId) -> Result<Vec<WorkflowRun>>;

    /// Append a journal entry.
    async fn append_journal(&self, run_id: RunId, entry: JournalEntry) -> Result<()>;

    /// Load the journal for a run.
    async fn load_journal(&self, run_id: RunId) -> Result<Journal>;
}

/// In-memory storage implementation for testing.
#[derive(Debug, Default)]
pub struct InMemoryRunStorage {
    runs: RwLock<HashMap<RunKey, WorkflowRun>>,
    journals: RwLock<HashMap<RunId, Journal>>,
}

impl InMemoryRunStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStorage for InMemoryRunStorage {
    async fn save_run(&self, run: &WorkflowRun) -> Result<()> {
        self.runs.write().await.insert(run.key.clone(), run.clone());
        Ok(())
    }

    async fn load_run(&self, key: &RunKey) -> Result<Option<WorkflowRun>> {
        Ok(self.runs.read().await.get(key).cloned())
    }

    async fn list_runs(&self, subscription_id: &SubscriptionId) -> Result<Vec<WorkflowRun>> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .filter(|r| &r.key.subscription_id == subscription_id)
            .cloned()
            .sorted_by_key(|r| r.key.renewal_date)
            .collect_vec())
    }

    async fn append_journal(&self, run_id: RunId, entry: JournalEntry) -> Result<()> {
        self.journals
            .write()
            .await
            .entry(run_id)
            .or_default()
            .append(entry);
        Ok(())
    }

    async fn load_journal(&self, run_id: RunId) -> Result<Journal> {
        Ok(self
            .journals
            .read()
            .await
            .get(&run_id)
            .cloned()
            .unwrap_or_default())
    }
}
