//! Subscription persistence.
//!
//! Subscriptions live next to their runs and timers, so a restarted server
//! still finds the subscription a recovered wake-up belongs to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtrack_core::{Subscription, SubscriptionId, SubscriptionSnapshot, SubscriptionStatus};
use surrealdb::sql::Thing;

use super::client::ReminderStore;
use super::error::{PersistenceResult, from_surrealdb_error, storage_error};
use crate::error::Result;
use crate::store::{SubscriptionRepository, SubscriptionStore};

const SUBSCRIPTION_TABLE: &str = "subscription";

/// A subscription joined with its owner, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubscriptionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Thing>,
    owner_id: String,
    status: String,
    renewal_date: String,
    snapshot_json: String,
}

impl SubscriptionRecord {
    fn from_snapshot(snapshot: &SubscriptionSnapshot) -> PersistenceResult<Self> {
        let subscription = &snapshot.subscription;
        Ok(Self {
            id: None,
            owner_id: subscription.owner.as_str().to_string(),
            status: subscription.status.to_string(),
            renewal_date: subscription.renewal_date.to_string(),
            snapshot_json: serde_json::to_string(snapshot)?,
        })
    }

    fn into_snapshot(self) -> PersistenceResult<SubscriptionSnapshot> {
        Ok(serde_json::from_str(&self.snapshot_json)?)
    }
}

impl ReminderStore {
    async fn upsert_subscription(&self, snapshot: &SubscriptionSnapshot) -> PersistenceResult<()> {
        let record = SubscriptionRecord::from_snapshot(snapshot)?;
        let _: Option<SubscriptionRecord> = self
            .db()
            .upsert((SUBSCRIPTION_TABLE, snapshot.subscription.id.as_str()))
            .content(record)
            .await
            .map_err(from_surrealdb_error)?;
        Ok(())
    }

    async fn select_subscription(
        &self,
        id: &SubscriptionId,
    ) -> PersistenceResult<Option<SubscriptionSnapshot>> {
        let record: Option<SubscriptionRecord> = self
            .db()
            .select((SUBSCRIPTION_TABLE, id.as_str()))
            .await
            .map_err(from_surrealdb_error)?;
        record.map(SubscriptionRecord::into_snapshot).transpose()
    }

    async fn modify_status(
        &self,
        id: &SubscriptionId,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> PersistenceResult<Option<Subscription>> {
        let Some(mut snapshot) = self.select_subscription(id).await? else {
            return Ok(None);
        };
        snapshot.subscription.status = status;
        snapshot.subscription.updated_at = now;
        self.upsert_subscription(&snapshot).await?;
        Ok(Some(snapshot.subscription))
    }

    async fn remove_subscription(
        &self,
        id: &SubscriptionId,
    ) -> PersistenceResult<Option<SubscriptionSnapshot>> {
        let record: Option<SubscriptionRecord> = self
            .db()
            .delete((SUBSCRIPTION_TABLE, id.as_str()))
            .await
            .map_err(from_surrealdb_error)?;
        record.map(SubscriptionRecord::into_snapshot).transpose()
    }
}

#[async_trait]
impl SubscriptionStore for ReminderStore {
    async fn find_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>> {
        self.select_subscription(id)
            .await
            .map_err(storage_error("find_subscription"))
    }
}

#[async_trait]
impl SubscriptionRepository for ReminderStore {
    async fn save_subscription(&self, snapshot: &SubscriptionSnapshot) -> Result<()> {
        self.upsert_subscription(snapshot)
            .await
            .map_err(storage_error("save_subscription"))
    }

    async fn set_status(
        &self,
        id: &SubscriptionId,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>> {
        self.modify_status(id, status, now)
            .await
            .map_err(storage_error("set_status"))
    }

    async fn delete_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>> {
        self.remove_subscription(id)
            .await
            .map_err(storage_error("delete_subscription"))
    }
}
