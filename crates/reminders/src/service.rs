//! Reminder subsystem facade and wiring.

use std::sync::Arc;

use async_trait::async_trait;
use subtrack_core::{Clock, ResultExt, SubscriptionId};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::engine::ReminderEngine;
use crate::error::{Error, Result};
use crate::gateway::{self, RunHandle, TriggerGateway};
use crate::notifier::Notifier;
use crate::storage::RunStorage;
use crate::store::SubscriptionStore;
use crate::timers::{
    DurableTimer, ExecutionResult, ResumePayload, TimerCallback, TimerExecutor, TimerScheduler,
    TimerStore, RESUME_RUN_CALLBACK,
};
use crate::types::{RunReport, WorkflowRun};

/// What the rest of the application sees of the reminder subsystem.
#[derive(Clone)]
pub struct ReminderService {
    engine: Arc<ReminderEngine>,
    gateway: Arc<dyn TriggerGateway>,
}

impl ReminderService {
    #[must_use]
    pub fn new(engine: Arc<ReminderEngine>, gateway: Arc<dyn TriggerGateway>) -> Self {
        Self { engine, gateway }
    }

    /// Schedule the reminder run of a freshly created subscription.
    ///
    /// Never fails: scheduling problems are logged and yield `None`, so
    /// subscription creation does not depend on the reminder subsystem.
    pub async fn on_subscription_created(&self, subscription_id: &SubscriptionId) -> Option<RunHandle> {
        self.gateway
            .schedule_run(subscription_id)
            .await
            .into_option_logged("Failed to schedule reminder run")
            .flatten()
    }

    /// Explicitly schedule a run for an existing subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TriggerNotConfigured`] when no substrate is
    /// configured, or the gateway's error when scheduling fails.
    pub async fn create_reminder_job(&self, subscription_id: &SubscriptionId) -> Result<RunHandle> {
        if !self.gateway.is_configured() {
            return Err(Error::TriggerNotConfigured);
        }
        self.gateway
            .schedule_run(subscription_id)
            .await?
            .ok_or(Error::TriggerNotConfigured)
    }

    /// Start or resume a run. Invoked by the substrate.
    ///
    /// # Errors
    ///
    /// See [`ReminderEngine::run`].
    pub async fn execute(&self, subscription_id: &SubscriptionId) -> Result<RunReport> {
        self.engine.run(subscription_id).await
    }

    /// Runs recorded for a subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if run storage fails.
    pub async fn runs(&self, subscription_id: &SubscriptionId) -> Result<Vec<WorkflowRun>> {
        self.engine.runs(subscription_id).await
    }

    /// Whether runs can be scheduled.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.gateway.is_configured()
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<ReminderEngine> {
        &self.engine
    }
}

/// Timer callback that re-enters the engine for the payload's subscription.
pub struct ResumeRunCallback {
    engine: Arc<ReminderEngine>,
}

impl ResumeRunCallback {
    #[must_use]
    pub const fn new(engine: Arc<ReminderEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TimerCallback for ResumeRunCallback {
    async fn execute(&self, timer: &DurableTimer) -> ExecutionResult {
        let payload: ResumePayload = match serde_json::from_value(timer.payload().clone()) {
            Ok(payload) => payload,
            Err(e) => {
                return ExecutionResult::Failed {
                    error: format!("invalid resume payload: {e}"),
                };
            }
        };

        debug!(
            timer_id = %timer.id(),
            subscription_id = %payload.subscription_id,
            label = ?payload.label,
            "Resuming reminder run"
        );

        match self.engine.run(&payload.subscription_id).await {
            Ok(_) => ExecutionResult::Success,
            Err(e) if e.is_retryable() => {
                warn!(timer_id = %timer.id(), error = %e, "Reminder run will be retried");
                ExecutionResult::Retry { delay_secs: None }
            }
            Err(e) => ExecutionResult::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// A fully wired reminder subsystem.
pub struct ReminderRuntime {
    pub service: ReminderService,
    pub scheduler: Arc<TimerScheduler>,
    pub executor: Arc<TimerExecutor>,
}

impl ReminderRuntime {
    /// Wire engine, timers and gateway together.
    ///
    /// Resume timers are routed to the engine. Call
    /// [`TimerScheduler::recover`] and spawn [`TimerExecutor::start`] to
    /// begin processing.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the gateway cannot be built.
    pub async fn build(
        settings: &Settings,
        store: Arc<dyn SubscriptionStore>,
        storage: Arc<dyn RunStorage>,
        timer_store: Arc<dyn TimerStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let scheduler = Arc::new(TimerScheduler::new(timer_store, Arc::clone(&clock)));
        let engine = Arc::new(
            ReminderEngine::new(store, storage, notifier, scheduler.clone(), clock)
                .with_config(settings.reminders.clone()),
        );

        let executor = Arc::new(TimerExecutor::with_logging(
            settings.timers.clone(),
            Arc::clone(&scheduler),
        ));
        executor
            .register_callback(
                RESUME_RUN_CALLBACK,
                Arc::new(ResumeRunCallback::new(Arc::clone(&engine))),
            )
            .await;

        let gateway = gateway::from_config(&settings.trigger, Arc::clone(&scheduler))?;

        Ok(Self {
            service: ReminderService::new(engine, gateway),
            scheduler,
            executor,
        })
    }
}
