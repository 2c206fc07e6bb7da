//! Durable renewal reminder workflow.
//!
//! For each subscription the engine builds a [`ReminderPlan`] of checkpoints
//! (7, 5, 3 and 1 days before renewal by default), fires the ones that are
//! due through a [`Notifier`], and suspends on a durable timer until the
//! next one. Progress lives in a persisted [`WorkflowRun`] keyed by
//! subscription and renewal date, so a restart resumes at the first
//! unfired checkpoint.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use subtrack_reminders::{ReminderRuntime, Settings, InMemoryRunStorage, InMemoryTimerStore};
//!
//! let runtime = ReminderRuntime::build(
//!     &Settings::from_env(),
//!     subscriptions,
//!     Arc::new(InMemoryRunStorage::new()),
//!     Arc::new(InMemoryTimerStore::new()),
//!     Arc::new(LoggingNotifier),
//!     Arc::new(SystemClock),
//! )
//! .await?;
//! runtime.scheduler.recover().await?;
//! tokio::spawn({
//!     let executor = runtime.executor.clone();
//!     async move { executor.start().await }
//! });
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod idempotent;
pub mod notifier;
pub mod persistence;
pub mod plan;
pub mod service;
pub mod storage;
pub mod store;
pub mod timers;
pub mod types;

pub use config::{ReminderConfig, Settings, TimerConfig, TriggerConfig, TriggerMode};
pub use engine::ReminderEngine;
pub use error::{Error, Result};
pub use gateway::{
    DisabledTriggerGateway, HttpTriggerGateway, RunHandle, TimerTriggerGateway, TriggerGateway,
};
pub use idempotent::reminder_key;
pub use notifier::{LoggingNotifier, Notifier, RecordingNotifier, ReminderNotice};
pub use persistence::{ReminderStore, StoreConfig};
pub use plan::{CheckpointLabel, DEFAULT_OFFSETS, ReminderCheckpoint, ReminderPlan};
pub use service::{ReminderRuntime, ReminderService, ResumeRunCallback};
pub use storage::{InMemoryRunStorage, RunStorage};
pub use store::{InMemorySubscriptionStore, SubscriptionRepository, SubscriptionStore};
pub use timers::{
    DurableTimer, ExecutionResult, InMemoryTimerStore, SuspendableTimer, TimerCallback,
    TimerExecutor, TimerId, TimerScheduler, TimerStatus, TimerStore, WakeRequest,
};
pub use types::{
    AbortReason, CheckpointRecord, Journal, JournalEntry, RunId, RunKey, RunOutcome, RunReport,
    RunState, WorkflowRun,
};
