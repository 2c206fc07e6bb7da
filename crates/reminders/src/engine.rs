//! Reminder run execution engine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use subtrack_core::{Clock, Subscription, SubscriptionId, SubscriptionSnapshot};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ReminderConfig;
use crate::error::Result;
use crate::idempotent::reminder_key;
use crate::notifier::{Notifier, ReminderNotice};
use crate::plan::{CheckpointLabel, ReminderCheckpoint, ReminderPlan};
use crate::storage::RunStorage;
use crate::store::SubscriptionStore;
use crate::timers::{SuspendableTimer, WakeRequest};
use crate::types::{
    AbortReason, CheckpointRecord, Journal, JournalEntry, RunKey, RunOutcome, RunReport, RunState,
    WorkflowRun,
};

/// Result of one pass over a run.
enum Pass {
    Finished(RunReport),
    /// The renewal date moved under the run; start over on the new cycle.
    Restart,
}

/// Drives reminder runs forward.
///
/// `run` is the single entry point for both the first start and every
/// resumption. It loads the persisted run for the subscription's current
/// renewal cycle, fires every checkpoint that is due, and suspends on a
/// durable timer when the next one lies in the future. Progress is persisted
/// after each checkpoint, so re-entering never fires a recorded checkpoint
/// twice.
pub struct ReminderEngine {
    store: Arc<dyn SubscriptionStore>,
    storage: Arc<dyn RunStorage>,
    notifier: Arc<dyn Notifier>,
    timer: Arc<dyn SuspendableTimer>,
    clock: Arc<dyn Clock>,
    config: ReminderConfig,
    /// Serialises invocations per subscription.
    locks: Mutex<HashMap<SubscriptionId, Arc<Mutex<()>>>>,
}

impl ReminderEngine {
    /// Create an engine with the default reminder schedule.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        storage: Arc<dyn RunStorage>,
        notifier: Arc<dyn Notifier>,
        timer: Arc<dyn SuspendableTimer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            storage,
            notifier,
            timer,
            clock,
            config: ReminderConfig::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use a custom reminder schedule.
    #[must_use]
    pub fn with_config(mut self, config: ReminderConfig) -> Self {
        self.config = config;
        self
    }

    /// The engine's time source.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Start or resume the reminder run of `subscription_id`.
    ///
    /// Aborts (`SubscriptionMissing`, `NotActive`, `RenewalPassed`,
    /// `RenewalChanged`) are reported as outcomes, not errors.
    ///
    /// # Errors
    ///
    /// Returns an error when run storage, the subscription store or the
    /// timer fail. The persisted run is left where it was, so the call can
    /// be retried.
    pub async fn run(&self, subscription_id: &SubscriptionId) -> Result<RunReport> {
        let lock = self.lock_for(subscription_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_locked(subscription_id).await
        };
        drop(lock);
        self.release_lock(subscription_id).await;

        match &result {
            Ok(report) => info!(
                subscription_id = %subscription_id,
                outcome = ?report.outcome,
                fired = report.fired.len(),
                "Reminder run advanced"
            ),
            Err(e) => warn!(
                subscription_id = %subscription_id,
                error = %e,
                "Reminder run failed"
            ),
        }
        result
    }

    /// All runs of a subscription, oldest renewal cycle first.
    ///
    /// # Errors
    ///
    /// Returns an error if run storage fails.
    pub async fn runs(&self, subscription_id: &SubscriptionId) -> Result<Vec<WorkflowRun>> {
        self.storage.list_runs(subscription_id).await
    }

    /// Journal of a run.
    ///
    /// # Errors
    ///
    /// Returns an error if run storage fails.
    pub async fn journal(&self, run: &WorkflowRun) -> Result<Journal> {
        self.storage.load_journal(run.run_id).await
    }

    async fn run_locked(&self, subscription_id: &SubscriptionId) -> Result<RunReport> {
        let mut fired = Vec::new();
        loop {
            match self.pass(subscription_id, &mut fired).await? {
                Pass::Finished(report) => return Ok(report),
                Pass::Restart => {
                    debug!(subscription_id = %subscription_id, "Renewal date moved, restarting run");
                }
            }
        }
    }

    async fn pass(
        &self,
        subscription_id: &SubscriptionId,
        fired: &mut Vec<CheckpointLabel>,
    ) -> Result<Pass> {
        let now = self.clock.now();

        let Some(snapshot) = self.store.find_subscription(subscription_id).await? else {
            self.abort_open_runs(subscription_id, None, AbortReason::SubscriptionMissing, now)
                .await?;
            let mut report =
                RunReport::aborted(subscription_id.clone(), AbortReason::SubscriptionMissing);
            report.fired = std::mem::take(fired);
            return Ok(Pass::Finished(report));
        };

        let key = RunKey::new(subscription_id.clone(), snapshot.subscription.renewal_date);
        // Open runs of any other cycle were left behind by a renewal date change.
        self.abort_open_runs(subscription_id, Some(&key), AbortReason::RenewalChanged, now)
            .await?;

        if let Some(reason) = guard(&snapshot.subscription, now) {
            return self.refuse(&key, reason, now, fired).await.map(Pass::Finished);
        }

        let plan = ReminderPlan::build(key.renewal_date, &self.config.offsets, self.config.fire_time)?;
        let mut run = self.load_or_start(&key, now).await?;

        if let Some(outcome) = run.terminal_outcome() {
            debug!(key = %key, state = %run.state, "Run already finished");
            return Ok(Pass::Finished(report(&run, outcome, fired)));
        }

        let mut fresh = Some(snapshot);
        while let Some(checkpoint) = plan.get(run.cursor) {
            if run.has_processed(&checkpoint.label) {
                run.advance();
                continue;
            }

            let now = self.clock.now();
            if !checkpoint.is_due(now) {
                let wake_at = self.suspend(&mut run, checkpoint, now).await?;
                return Ok(Pass::Finished(report(
                    &run,
                    RunOutcome::Suspended { wake_at },
                    fired,
                )));
            }

            self.transition(&mut run, RunState::Evaluating, now).await?;

            // The subscription may have changed during the sleep.
            let snapshot = match fresh.take() {
                Some(snapshot) => snapshot,
                None => match self.store.find_subscription(subscription_id).await? {
                    Some(snapshot) => snapshot,
                    None => {
                        let outcome =
                            self.abort(&mut run, AbortReason::SubscriptionMissing, now).await?;
                        return Ok(Pass::Finished(report(&run, outcome, fired)));
                    }
                },
            };

            if let Some(reason) = guard(&snapshot.subscription, now) {
                let outcome = self.abort(&mut run, reason, now).await?;
                return Ok(Pass::Finished(report(&run, outcome, fired)));
            }
            if snapshot.subscription.renewal_date != run.key.renewal_date {
                self.abort(&mut run, AbortReason::RenewalChanged, now).await?;
                return Ok(Pass::Restart);
            }

            self.fire(&mut run, checkpoint, &snapshot, now).await?;
            fired.push(checkpoint.label.clone());
        }

        let now = self.clock.now();
        self.transition(&mut run, RunState::Completed, now).await?;
        self.storage.save_run(&run).await?;
        info!(key = %run.key, checkpoints = run.checkpoints.len(), "Reminder run completed");

        Ok(Pass::Finished(report(&run, RunOutcome::Completed, fired)))
    }

    async fn load_or_start(&self, key: &RunKey, now: DateTime<Utc>) -> Result<WorkflowRun> {
        if let Some(run) = self.storage.load_run(key).await? {
            return Ok(run);
        }

        let run = WorkflowRun::new(key.clone(), now);
        self.storage.save_run(&run).await?;
        self.storage
            .append_journal(run.run_id, JournalEntry::run_started(key.clone(), now))
            .await?;
        info!(key = %key, run_id = %run.run_id, "Reminder run started");
        Ok(run)
    }

    /// Persist the wake time, then register the durable timer.
    async fn suspend(
        &self,
        run: &mut WorkflowRun,
        checkpoint: &ReminderCheckpoint,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let wake_at = checkpoint.fire_at;
        self.transition(run, RunState::Sleeping, now).await?;
        run.wake_at = Some(wake_at);
        self.storage.save_run(run).await?;

        let timer_id = self
            .timer
            .sleep_until(WakeRequest {
                key: run.key.clone(),
                label: checkpoint.label.clone(),
                offset_days: checkpoint.offset_days,
                wake_at,
            })
            .await?;

        self.storage
            .append_journal(
                run.run_id,
                JournalEntry::sleep_scheduled(checkpoint.label.clone(), wake_at, now),
            )
            .await?;
        debug!(
            key = %run.key,
            label = %checkpoint.label,
            wake_at = %wake_at,
            timer_id = %timer_id,
            "Run suspended"
        );
        Ok(wake_at)
    }

    /// Deliver one checkpoint and record it.
    ///
    /// A notifier failure is journaled and the checkpoint still counts as
    /// processed.
    async fn fire(
        &self,
        run: &mut WorkflowRun,
        checkpoint: &ReminderCheckpoint,
        snapshot: &SubscriptionSnapshot,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let late = checkpoint.is_late(now);
        let idempotency_key =
            reminder_key(&run.key.subscription_id, run.key.renewal_date, &checkpoint.label)?;

        let notice = ReminderNotice {
            recipient: snapshot.owner.clone(),
            label: checkpoint.label.clone(),
            days_before: checkpoint.offset_days,
            subscription: snapshot.subscription.clone(),
            idempotency_key,
            late,
        };

        let delivered = match self.notifier.send(&notice).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    key = %run.key,
                    label = %checkpoint.label,
                    error = %e,
                    "Reminder delivery failed, continuing"
                );
                self.storage
                    .append_journal(
                        run.run_id,
                        JournalEntry::notifier_failed(checkpoint.label.clone(), e.to_string(), now),
                    )
                    .await?;
                false
            }
        };

        run.record(CheckpointRecord {
            label: checkpoint.label.clone(),
            offset_days: checkpoint.offset_days,
            idempotency_key,
            fire_at: checkpoint.fire_at,
            processed_at: now,
            delivered,
            late,
        });
        self.storage.save_run(run).await?;
        self.storage
            .append_journal(
                run.run_id,
                JournalEntry::checkpoint_fired(checkpoint.label.clone(), late, now),
            )
            .await?;

        info!(key = %run.key, label = %checkpoint.label, late, delivered, "Checkpoint fired");
        Ok(())
    }

    /// Report a guard failure, closing the cycle's run if one is open.
    async fn refuse(
        &self,
        key: &RunKey,
        reason: AbortReason,
        now: DateTime<Utc>,
        fired: &mut Vec<CheckpointLabel>,
    ) -> Result<RunReport> {
        let Some(mut run) = self.storage.load_run(key).await? else {
            info!(key = %key, reason = %reason, "Reminder run not started");
            let mut report = RunReport::aborted(key.subscription_id.clone(), reason);
            report.renewal_date = Some(key.renewal_date);
            report.fired = std::mem::take(fired);
            return Ok(report);
        };

        if !run.state.is_terminal() {
            self.abort(&mut run, reason, now).await?;
        }
        Ok(report(&run, RunOutcome::Aborted { reason }, fired))
    }

    async fn abort(
        &self,
        run: &mut WorkflowRun,
        reason: AbortReason,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        self.transition(run, RunState::Aborted, now).await?;
        run.abort_reason = Some(reason);
        self.storage.save_run(run).await?;
        self.storage
            .append_journal(run.run_id, JournalEntry::run_aborted(reason, now))
            .await?;
        info!(key = %run.key, reason = %reason, "Reminder run aborted");
        Ok(RunOutcome::Aborted { reason })
    }

    /// Abort every open run of `subscription_id` except the one at `keep`.
    async fn abort_open_runs(
        &self,
        subscription_id: &SubscriptionId,
        keep: Option<&RunKey>,
        reason: AbortReason,
        now: DateTime<Utc>,
    ) -> Result<()> {
        for mut run in self.storage.list_runs(subscription_id).await? {
            if run.state.is_terminal() || keep.is_some_and(|k| k == &run.key) {
                continue;
            }
            self.abort(&mut run, reason, now).await?;
        }
        Ok(())
    }

    /// Move `run` to `to` and journal the change. Does not persist the run.
    async fn transition(
        &self,
        run: &mut WorkflowRun,
        to: RunState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let from = run.state;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            warn!(key = %run.key, from = %from, to = %to, "Ignoring invalid run transition");
            return Ok(());
        }

        run.state = to;
        run.updated_at = now;
        if to != RunState::Sleeping {
            run.wake_at = None;
        }
        self.storage
            .append_journal(run.run_id, JournalEntry::state_changed(from, to, now))
            .await
    }

    async fn lock_for(&self, subscription_id: &SubscriptionId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .await
                .entry(subscription_id.clone())
                .or_default(),
        )
    }

    /// Drop the lock entry once no other invocation holds it.
    async fn release_lock(&self, subscription_id: &SubscriptionId) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(subscription_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(subscription_id);
        }
    }
}

/// Reason a subscription must not receive reminders at `now`, if any.
fn guard(subscription: &Subscription, now: DateTime<Utc>) -> Option<AbortReason> {
    if !subscription.status.is_active() {
        Some(AbortReason::NotActive)
    } else if subscription.renewal_date < now.date_naive() {
        Some(AbortReason::RenewalPassed)
    } else {
        None
    }
}

fn report(run: &WorkflowRun, outcome: RunOutcome, fired: &mut Vec<CheckpointLabel>) -> RunReport {
    RunReport {
        subscription_id: run.key.subscription_id.clone(),
        run_id: Some(run.run_id),
        renewal_date: Some(run.key.renewal_date),
        outcome,
        fired: std::mem::take(fired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::storage::InMemoryRunStorage;
    use crate::store::InMemorySubscriptionStore;
    use crate::timers::TimerScheduler;
    use chrono::{NaiveDate, TimeZone};
    use subtrack_core::{
        Category, Currency, Frequency, ManualClock, OwnerContact, SubscriptionStatus, UserId,
    };

    struct Harness {
        clock: ManualClock,
        store: Arc<InMemorySubscriptionStore>,
        notifier: RecordingNotifier,
        timers: Arc<TimerScheduler>,
        engine: ReminderEngine,
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
    }

    fn snapshot(id: &str, renewal: NaiveDate, status: SubscriptionStatus) -> SubscriptionSnapshot {
        let owner = UserId::new("user-1");
        SubscriptionSnapshot {
            subscription: Subscription {
                id: SubscriptionId::new(id),
                name: "Netflix".to_string(),
                price: 15.99,
                currency: Currency::Usd,
                frequency: Frequency::Monthly,
                category: Category::Entertainment,
                payment_method: "card".to_string(),
                status,
                start_date: date(2026, 1, 1),
                renewal_date: renewal,
                owner: owner.clone(),
                created_at: at(2026, 1, 1),
                updated_at: at(2026, 1, 1),
            },
            owner: OwnerContact {
                id: owner,
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
            },
        }
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        let clock = ManualClock::new(now);
        let store = Arc::new(InMemorySubscriptionStore::new());
        let notifier = RecordingNotifier::new();
        let timers = Arc::new(TimerScheduler::in_memory(Arc::new(clock.clone())));
        let engine = ReminderEngine::new(
            store.clone(),
            Arc::new(InMemoryRunStorage::new()),
            Arc::new(notifier.clone()),
            timers.clone(),
            Arc::new(clock.clone()),
        );
        Harness {
            clock,
            store,
            notifier,
            timers,
            engine,
        }
    }

    #[tokio::test]
    async fn test_missing_subscription_aborts() -> Result<()> {
        let h = harness(at(2026, 1, 1));
        let report = h.engine.run(&SubscriptionId::new("ghost")).await?;
        assert_eq!(
            report.outcome,
            RunOutcome::Aborted {
                reason: AbortReason::SubscriptionMissing
            }
        );
        assert!(report.run_id.is_none());
        assert_eq!(h.notifier.attempts(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_subscription_aborts() -> Result<()> {
        let h = harness(at(2026, 1, 1));
        h.store
            .insert(snapshot("s1", date(2026, 1, 31), SubscriptionStatus::Canceled))
            .await;
        let report = h.engine.run(&SubscriptionId::new("s1")).await?;
        assert_eq!(
            report.outcome,
            RunOutcome::Aborted {
                reason: AbortReason::NotActive
            }
        );
        assert_eq!(h.timers.pending_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_first_run_suspends_until_first_checkpoint() -> Result<()> {
        let h = harness(at(2026, 1, 1));
        h.store
            .insert(snapshot("s1", date(2026, 1, 31), SubscriptionStatus::Active))
            .await;

        let report = h.engine.run(&SubscriptionId::new("s1")).await?;
        assert_eq!(
            report.outcome,
            RunOutcome::Suspended {
                wake_at: at(2026, 1, 24)
            }
        );
        assert!(report.fired.is_empty());
        assert_eq!(h.timers.pending_count().await, 1);
        assert_eq!(h.timers.peek_next().await, Some(at(2026, 1, 24)));

        let runs = h.engine.runs(&SubscriptionId::new("s1")).await?;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs.first().map(|r| r.state), Some(RunState::Sleeping));
        Ok(())
    }

    #[tokio::test]
    async fn test_rerun_while_sleeping_keeps_one_timer() -> Result<()> {
        let h = harness(at(2026, 1, 1));
        h.store
            .insert(snapshot("s1", date(2026, 1, 31), SubscriptionStatus::Active))
            .await;
        let id = SubscriptionId::new("s1");

        h.engine.run(&id).await?;
        h.engine.run(&id).await?;
        assert_eq!(h.timers.pending_count().await, 1);
        assert_eq!(h.engine.runs(&id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_due_checkpoint_fires_once() -> Result<()> {
        let h = harness(at(2026, 1, 24));
        h.store
            .insert(snapshot("s1", date(2026, 1, 31), SubscriptionStatus::Active))
            .await;
        let id = SubscriptionId::new("s1");

        let report = h.engine.run(&id).await?;
        assert_eq!(report.fired, vec![CheckpointLabel::for_offset(7)]);
        let again = h.engine.run(&id).await?;
        assert!(again.fired.is_empty());
        assert_eq!(h.notifier.delivered_labels(), vec!["7 days before reminder"]);

        let runs = h.engine.runs(&id).await?;
        let Some(run) = runs.first() else {
            return Ok(());
        };
        let journal = h.engine.journal(run).await?;
        assert_eq!(journal.fired_labels(), vec![&CheckpointLabel::for_offset(7)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_renewal_change_restarts_on_new_cycle() -> Result<()> {
        let h = harness(at(2026, 1, 1));
        h.store
            .insert(snapshot("s1", date(2026, 1, 31), SubscriptionStatus::Active))
            .await;
        let id = SubscriptionId::new("s1");
        h.engine.run(&id).await?;

        h.store.update_renewal_date(&id, date(2026, 3, 2)).await;
        h.clock.set(at(2026, 1, 24));
        let report = h.engine.run(&id).await?;

        assert_eq!(report.renewal_date, Some(date(2026, 3, 2)));
        assert!(matches!(report.outcome, RunOutcome::Suspended { .. }));
        assert_eq!(h.notifier.attempts(), 0);

        let runs = h.engine.runs(&id).await?;
        assert_eq!(runs.len(), 2);
        assert_eq!(
            runs.first().and_then(|r| r.abort_reason),
            Some(AbortReason::RenewalChanged)
        );
        Ok(())
    }
}
