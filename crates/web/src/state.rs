//! Shared handler state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use subtrack_core::Clock;
use subtrack_reminders::{ReminderService, SubscriptionRepository};

/// State handed to every handler.
///
/// The reminder engine reads subscriptions from the same repository, so a
/// cancel or delete here is what its next wake-up sees.
#[derive(Clone)]
pub struct AppState {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub reminders: ReminderService,
}

impl AppState {
    #[must_use]
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, reminders: ReminderService) -> Self {
        Self {
            subscriptions,
            reminders,
        }
    }

    /// Current time as seen by the reminder engine.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.reminders.engine().clock().now()
    }
}
