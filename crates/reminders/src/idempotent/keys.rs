//! UUID v5 reminder keys.

use chrono::NaiveDate;
use subtrack_core::SubscriptionId;
use uuid::Uuid;

use super::hash::hash_serializable;
use crate::error::Result;
use crate::plan::CheckpointLabel;

/// Namespace UUID scoping every key of one subscription.
///
/// `UUID v5(DNS_NAMESPACE, subscription_id)`.
#[must_use]
pub fn namespace_for_subscription(subscription_id: &SubscriptionId) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, subscription_id.as_str().as_bytes())
}

/// Idempotency key of one reminder delivery.
///
/// ```text
/// namespace = UUID v5(DNS_NAMESPACE, subscription_id)
/// name      = SHA-256(bincode((renewal_date, label)))
/// key       = UUID v5(namespace, name)
/// ```
///
/// # Errors
///
/// Returns a serialization error if the input cannot be encoded.
pub fn reminder_key(
    subscription_id: &SubscriptionId,
    renewal_date: NaiveDate,
    label: &CheckpointLabel,
) -> Result<Uuid> {
    let namespace = namespace_for_subscription(subscription_id);
    let name = hash_serializable(&(renewal_date, label))?;
    Ok(Uuid::new_v5(&namespace, &name))
}
