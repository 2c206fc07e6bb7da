//! Deterministic idempotency keys for reminder deliveries.
//!
//! A key is a UUID v5 whose namespace is derived from the subscription id and
//! whose name is the SHA-256 of the bincode-encoded `(renewal_date, label)`
//! pair. The same reminder of the same cycle always yields the same key, so a
//! notifier can drop a delivery it has already seen when a crash lands between
//! sending and recording.

pub mod hash;
pub mod keys;

pub use hash::{hash_input, hash_serializable};
pub use keys::{namespace_for_subscription, reminder_key};
