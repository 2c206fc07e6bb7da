//! Core domain types for SubTrack: subscriptions, renewal arithmetic, time
//! sources and the shared error type.

pub mod clock;
pub mod error;
pub mod renewal;
pub mod result;
pub mod subscription;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::Error;
pub use renewal::{compute_renewal_date, compute_status};
pub use result::{Result, ResultExt};
pub use subscription::{
    Category, Currency, Frequency, NewSubscription, OwnerContact, Subscription, SubscriptionId,
    SubscriptionSnapshot, SubscriptionStatus, UserId,
};
