//! SurrealDB-backed persistence for subscriptions, runs, journals and timers.
//!
//! [`ReminderStore`] implements [`crate::store::SubscriptionRepository`],
//! [`crate::storage::RunStorage`] and [`crate::timers::TimerStore`], so a
//! single connection makes the whole reminder subsystem durable:
//!
//! ```ignore
//! let store = Arc::new(ReminderStore::open(StoreConfig::rocksdb("data")).await?);
//! let scheduler = TimerScheduler::new(store.clone(), clock.clone());
//! scheduler.recover().await?;
//! ```

pub mod client;
pub mod error;
mod run_store;
mod subscription_store;
mod timer_store;

pub use client::{Credentials, ReminderStore, StoreConfig};
pub use error::{PersistenceError, PersistenceResult, from_surrealdb_error};
