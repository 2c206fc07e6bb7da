//! Access to subscriptions.
//!
//! The subscription record belongs to the data store; the reminder engine
//! only ever reads snapshots of it through [`SubscriptionStore`]. The HTTP
//! surface writes through [`SubscriptionRepository`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use subtrack_core::{Subscription, SubscriptionId, SubscriptionSnapshot, SubscriptionStatus};
use tokio::sync::RwLock;

use crate::error::Result;

/// Trait for the subscription data store.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Fetch a subscription joined with its owner's contact.
    async fn find_subscription(&self, id: &SubscriptionId)
    -> Result<Option<SubscriptionSnapshot>>;
}

/// Read-write subscription store.
#[async_trait]
pub trait SubscriptionRepository: SubscriptionStore {
    /// Insert or replace a subscription.
    async fn save_subscription(&self, snapshot: &SubscriptionSnapshot) -> Result<()>;

    /// Change the stored status. Returns the updated subscription, or `None`
    /// when the id is unknown.
    async fn set_status(
        &self,
        id: &SubscriptionId,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>>;

    /// Delete a subscription. Returns the removed record.
    async fn delete_subscription(&self, id: &SubscriptionId)
    -> Result<Option<SubscriptionSnapshot>>;
}

/// In-memory subscription store.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: RwLock<HashMap<SubscriptionId, SubscriptionSnapshot>>,
}

impl InMemorySubscriptionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a subscription.
    pub async fn insert(&self, snapshot: SubscriptionSnapshot) {
        self.subscriptions
            .write()
            .await
            .insert(snapshot.subscription.id.clone(), snapshot);
    }

    /// Change the stored status. Returns false when the id is unknown.
    pub async fn update_status(&self, id: &SubscriptionId, status: SubscriptionStatus) -> bool {
        match self.subscriptions.write().await.get_mut(id) {
            Some(snapshot) => {
                snapshot.subscription.status = status;
                true
            }
            None => false,
        }
    }

    /// Move the renewal date. Returns false when the id is unknown.
    pub async fn update_renewal_date(&self, id: &SubscriptionId, renewal_date: NaiveDate) -> bool {
        match self.subscriptions.write().await.get_mut(id) {
            Some(snapshot) => {
                snapshot.subscription.renewal_date = renewal_date;
                true
            }
            None => false,
        }
    }

    /// Delete a subscription. Returns the removed record.
    pub async fn remove(&self, id: &SubscriptionId) -> Option<SubscriptionSnapshot> {
        self.subscriptions.write().await.remove(id)
    }

    /// Number of stored subscriptions.
    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>> {
        Ok(self.subscriptions.read().await.get(id).cloned())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionStore {
    async fn save_subscription(&self, snapshot: &SubscriptionSnapshot) -> Result<()> {
        self.insert(snapshot.clone()).await;
        Ok(())
    }

    async fn set_status(
        &self,
        id: &SubscriptionId,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>> {
        Ok(self.subscriptions.write().await.get_mut(id).map(|snapshot| {
            snapshot.subscription.status = status;
            snapshot.subscription.updated_at = now;
            snapshot.subscription.clone()
        }))
    }

    async fn delete_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>> {
        Ok(self.remove(id).await)
    }
}
