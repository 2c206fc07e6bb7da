//! Timer execution handling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::scheduler::{DurableTimer, TimerScheduler};
use crate::config::TimerConfig;

/// Result of timer execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Timer executed successfully.
    Success,
    /// Timer execution failed and must not be retried.
    Failed {
        /// Error message
        error: String,
    },
    /// Timer execution should be retried.
    Retry {
        /// Delay before retry; `None` uses the configured delay.
        delay_secs: Option<u64>,
    },
}

impl ExecutionResult {
    /// Check if execution was successful.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check if execution should be retried.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

/// Callback for timer execution.
#[async_trait]
pub trait TimerCallback: Send + Sync {
    /// Called when the timer fires.
    async fn execute(&self, timer: &DurableTimer) -> ExecutionResult;
}

/// A callback that logs timer execution.
pub struct LoggingCallback;

#[async_trait]
impl TimerCallback for LoggingCallback {
    async fn execute(&self, timer: &DurableTimer) -> ExecutionResult {
        info!(
            timer_id = %timer.id(),
            payload = %timer.payload(),
            "Timer executed"
        );
        ExecutionResult::Success
    }
}

type CallbackMap = Arc<RwLock<HashMap<String, Arc<dyn TimerCallback>>>>;

/// Executes fired timers on a bounded pool of tasks.
pub struct TimerExecutor {
    config: TimerConfig,
    scheduler: Arc<TimerScheduler>,
    callbacks: CallbackMap,
    default_callback: Arc<dyn TimerCallback>,
    permits: Arc<Semaphore>,
    running: Arc<RwLock<bool>>,
}

impl TimerExecutor {
    /// Create a new timer executor.
    #[must_use]
    pub fn new(
        config: TimerConfig,
        scheduler: Arc<TimerScheduler>,
        default_callback: Arc<dyn TimerCallback>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config,
            scheduler,
            callbacks: Arc::new(RwLock::new(HashMap::new())),
            default_callback,
            permits,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Create an executor with logging callback.
    #[must_use]
    pub fn with_logging(config: TimerConfig, scheduler: Arc<TimerScheduler>) -> Self {
        Self::new(config, scheduler, Arc::new(LoggingCallback))
    }

    /// Register a callback for a specific callback ID.
    pub async fn register_callback(
        &self,
        callback_id: impl Into<String>,
        callback: Arc<dyn TimerCallback>,
    ) {
        self.callbacks
            .write()
            .await
            .insert(callback_id.into(), callback);
    }

    /// Start the executor loop.
    ///
    /// Runs until [`TimerExecutor::stop`] is called, then waits for
    /// in-flight callbacks.
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        info!(
            tick_interval_ms = self.config.tick_interval_ms,
            max_concurrent = self.config.max_concurrent,
            "Timer executor starting"
        );

        let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms.max(1)));
        let mut in_flight = JoinSet::new();

        loop {
            ticker.tick().await;

            if !*self.running.read().await {
                break;
            }

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Timer task panicked or was aborted");
                }
            }

            self.dispatch(&mut in_flight).await;
        }

        while in_flight.join_next().await.is_some() {}
        info!("Timer executor stopped");
    }

    /// Stop the executor.
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// Get the number of in-flight executions.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.config
            .max_concurrent
            .max(1)
            .saturating_sub(self.permits.available_permits())
    }

    /// Poll due timers and run their callbacks to completion.
    ///
    /// Returns the number of timers executed.
    pub async fn tick(&self) -> usize {
        let mut in_flight = JoinSet::new();
        let dispatched = self.dispatch(&mut in_flight).await;
        while in_flight.join_next().await.is_some() {}
        dispatched
    }

    /// Spawn callbacks for as many due timers as there are free permits.
    async fn dispatch(&self, in_flight: &mut JoinSet<()>) -> usize {
        let available = self.permits.available_permits();
        if available == 0 {
            debug!("Concurrency limit reached, deferring execution");
            return 0;
        }

        let due = self.scheduler.poll_due_with_limit(available).await;
        let count = due.len();

        for timer in due {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                warn!("Executor permits closed");
                break;
            };
            let callback = self.callback_for(&timer).await;
            let scheduler = Arc::clone(&self.scheduler);
            let config = self.config.clone();

            in_flight.spawn(async move {
                run_timer(&scheduler, callback.as_ref(), timer, &config).await;
                drop(permit);
            });
        }

        count
    }

    /// Get the callback for a timer.
    async fn callback_for(&self, timer: &DurableTimer) -> Arc<dyn TimerCallback> {
        if let Some(callback_id) = timer.callback_id() {
            if let Some(callback) = self.callbacks.read().await.get(callback_id) {
                return Arc::clone(callback);
            }
        }
        Arc::clone(&self.default_callback)
    }
}

/// Execute one fired timer and settle its final status.
async fn run_timer(
    scheduler: &TimerScheduler,
    callback: &dyn TimerCallback,
    timer: DurableTimer,
    config: &TimerConfig,
) {
    let timer_id = timer.id().clone();

    let settled = match callback.execute(&timer).await {
        ExecutionResult::Success => {
            debug!(timer_id = %timer_id, "Timer execution succeeded");
            scheduler.complete(&timer_id).await
        }
        ExecutionResult::Failed { error } => {
            error!(timer_id = %timer_id, error = %error, "Timer execution failed");
            scheduler.fail(&timer_id).await
        }
        ExecutionResult::Retry { delay_secs } => {
            if timer.attempts() >= config.max_retries {
                error!(
                    timer_id = %timer_id,
                    attempts = timer.attempts(),
                    "Timer retries exhausted"
                );
                scheduler.fail(&timer_id).await
            } else {
                let delay_secs = delay_secs.unwrap_or(config.retry_delay_secs);
                warn!(timer_id = %timer_id, delay_secs, "Timer execution requested retry");
                scheduler.reschedule(timer, delay_secs).await
            }
        }
    };

    if let Err(e) = settled {
        error!(timer_id = %timer_id, error = %e, "Failed to persist timer outcome");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timers::TimerId;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use subtrack_core::ManualClock;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    struct CountingCallback {
        calls: AtomicUsize,
        result: ExecutionResult,
    }

    #[async_trait]
    impl TimerCallback for CountingCallback {
        async fn execute(&self, _timer: &DurableTimer) -> ExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn setup(result: ExecutionResult) -> (ManualClock, Arc<TimerScheduler>, Arc<CountingCallback>) {
        let clock = ManualClock::new(start());
        let scheduler = Arc::new(TimerScheduler::in_memory(Arc::new(clock.clone())));
        let callback = Arc::new(CountingCallback {
            calls: AtomicUsize::new(0),
            result,
        });
        (clock, scheduler, callback)
    }

    fn timer(id: &str) -> DurableTimer {
        DurableTimer::new(TimerId::from_string(id), start(), serde_json::json!({}), start())
            .with_callback("count")
    }

    #[test]
    fn test_execution_result_predicates() {
        assert!(ExecutionResult::Success.is_success());
        assert!(ExecutionResult::Retry { delay_secs: None }.should_retry());
        assert!(!ExecutionResult::Failed {
            error: "x".to_string()
        }
        .is_success());
    }

    #[tokio::test]
    async fn test_tick_runs_registered_callback() -> crate::error::Result<()> {
        let (_clock, scheduler, callback) = setup(ExecutionResult::Success);
        let executor = TimerExecutor::with_logging(TimerConfig::default(), Arc::clone(&scheduler));
        executor.register_callback("count", callback.clone()).await;

        scheduler.schedule(timer("a")).await?;
        scheduler.schedule(timer("b")).await?;

        assert_eq!(executor.tick().await, 2);
        assert_eq!(callback.calls.load(Ordering::SeqCst), 2);
        assert_eq!(executor.tick().await, 0);
        assert_eq!(executor.in_flight_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_reschedules_until_exhausted() -> crate::error::Result<()> {
        let (clock, scheduler, callback) = setup(ExecutionResult::Retry {
            delay_secs: Some(10),
        });
        let config = TimerConfig {
            max_retries: 2,
            ..TimerConfig::default()
        };
        let executor = TimerExecutor::new(config, Arc::clone(&scheduler), callback.clone());

        scheduler.schedule(timer("flaky")).await?;

        for _ in 0..3 {
            executor.tick().await;
            clock.advance(chrono::Duration::seconds(10));
        }
        assert_eq!(callback.calls.load(Ordering::SeqCst), 3);
        assert_eq!(executor.tick().await, 0);
        assert_eq!(scheduler.pending_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrency_limit_bounds_dispatch() -> crate::error::Result<()> {
        let (_clock, scheduler, callback) = setup(ExecutionResult::Success);
        let config = TimerConfig {
            max_concurrent: 1,
            ..TimerConfig::default()
        };
        let executor = TimerExecutor::new(config, Arc::clone(&scheduler), callback.clone());

        scheduler.schedule(timer("one")).await?;
        scheduler.schedule(timer("two")).await?;

        assert_eq!(executor.tick().await, 1);
        assert_eq!(executor.tick().await, 1);
        assert_eq!(callback.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
