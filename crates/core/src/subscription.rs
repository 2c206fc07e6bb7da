//! Subscription data model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::Error;
use crate::renewal;
use crate::result::Result;

/// Opaque, stable subscription identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of the user owning a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Billing frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// All recognised frequencies.
    pub const ALL: [Self; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Yearly];

    /// Length of one billing period in days.
    ///
    /// Months and years are fixed-length (30 and 365 days), not calendar
    /// months.
    #[must_use]
    pub const fn period_days(self) -> u64 {
        match self {
            Self::Daily => 1,
            Self::Weekly => 7,
            Self::Monthly => 30,
            Self::Yearly => 365,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Renewal date one period after `start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DateOutOfRange`] if the result overflows the calendar.
    pub fn renewal_after(self, start: NaiveDate) -> Result<NaiveDate> {
        renewal::add_days(start, self.period_days())
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(Error::invalid_frequency(s)),
        }
    }
}

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    #[serde(alias = "cancelled")]
    Canceled,
}

impl SubscriptionStatus {
    /// Whether reminders may still be sent.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Canceled => "canceled",
        }
    }
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            _ => Err(Error::invalid_enum("status", s)),
        }
    }
}

/// Billing currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Dop,
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "DOP" => Ok(Self::Dop),
            _ => Err(Error::invalid_enum("currency", s)),
        }
    }
}

/// Subscription category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sports,
    News,
    Entertainment,
    Lifestyle,
    Technology,
    Finance,
    Politics,
    Other,
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sports" => Ok(Self::Sports),
            "news" => Ok(Self::News),
            "entertainment" => Ok(Self::Entertainment),
            "lifestyle" => Ok(Self::Lifestyle),
            "technology" => Ok(Self::Technology),
            "finance" => Ok(Self::Finance),
            "politics" => Ok(Self::Politics),
            "other" => Ok(Self::Other),
            _ => Err(Error::invalid_enum("category", s)),
        }
    }
}

/// A validated subscription as held by the data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: SubscriptionId,
    pub name: String,
    pub price: f64,
    pub currency: Currency,
    pub frequency: Frequency,
    pub category: Category,
    pub payment_method: String,
    pub status: SubscriptionStatus,
    pub start_date: NaiveDate,
    pub renewal_date: NaiveDate,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Status as observed at `now`: past-due renewals read as expired.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        renewal::compute_status(self.renewal_date, now, self.status)
    }
}

/// Contact details of a subscription owner, as needed to address a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContact {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// Read-only view of a subscription joined with its owner's contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub subscription: Subscription,
    pub owner: OwnerContact,
}

/// Unvalidated subscription input, as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub status: Option<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub renewal_date: Option<NaiveDate>,
}

impl NewSubscription {
    /// Validate the input and derive the stored subscription.
    ///
    /// The renewal date is computed from the frequency only when none was
    /// supplied. The status is forced to expired when the renewal date is
    /// already behind `now`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrequency`] for an unknown frequency and
    /// [`Error::Validation`] listing every other violated constraint.
    pub fn validate(
        self,
        id: SubscriptionId,
        owner: UserId,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        let frequency: Frequency = self.frequency.parse()?;
        let mut messages = Vec::new();

        let name = self.name.trim().to_string();
        let name_len = name.chars().count();
        if !(2..=100).contains(&name_len) {
            messages.push("Subscription name must be between 2 and 100 characters".to_string());
        }

        let price = match self.price {
            Some(p) if p.is_finite() && p >= 0.0 => p,
            Some(_) => {
                messages.push("Price must be greater than 0".to_string());
                0.0
            }
            None => {
                messages.push("Subscription price is required".to_string());
                0.0
            }
        };

        let currency = self
            .currency
            .parse::<Currency>()
            .map_err(|e| messages.push(e.to_string()))
            .ok();
        let category = self
            .category
            .parse::<Category>()
            .map_err(|e| messages.push(e.to_string()))
            .ok();
        let status = match self.status.as_deref() {
            Some(raw) => raw
                .parse::<SubscriptionStatus>()
                .map_err(|e| messages.push(e.to_string()))
                .ok(),
            None => Some(SubscriptionStatus::default()),
        };

        let payment_method = self.payment_method.trim().to_string();
        if payment_method.is_empty() {
            messages.push("Payment method is required".to_string());
        }

        if self.start_date > now.date_naive() {
            messages.push("Start date must be in the past".to_string());
        }

        let renewal_date = match self.renewal_date {
            Some(date) => date,
            None => frequency.renewal_after(self.start_date)?,
        };
        if renewal_date <= self.start_date {
            messages.push("Renewal date must be after the start date".to_string());
        }

        match (currency, category, status) {
            (Some(currency), Some(category), Some(status)) if messages.is_empty() => {
                Ok(Subscription {
                    id,
                    name,
                    price,
                    currency,
                    frequency,
                    category,
                    payment_method,
                    status: renewal::compute_status(renewal_date, now, status),
                    start_date: self.start_date,
                    renewal_date,
                    owner,
                    created_at: now,
                    updated_at: now,
                })
            }
            _ => Err(Error::validation(messages)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single()
    }

    fn input(start: NaiveDate) -> NewSubscription {
        NewSubscription {
            name: "Netflix Premium".to_string(),
            price: Some(15.99),
            currency: "USD".to_string(),
            frequency: "monthly".to_string(),
            category: "entertainment".to_string(),
            payment_method: "Credit Card".to_string(),
            status: None,
            start_date: start,
            renewal_date: None,
        }
    }

    #[test]
    fn test_frequency_parse_round_trip() -> Result<()> {
        for f in Frequency::ALL {
            assert_eq!(f.as_str().parse::<Frequency>()?, f);
        }
        assert!(matches!(
            "fortnightly".parse::<Frequency>(),
            Err(Error::InvalidFrequency { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_enum_parsing_is_exact() {
        for raw in ["Monthly", "MONTHLY", " weekly", "yearly "] {
            assert!(
                matches!(raw.parse::<Frequency>(), Err(Error::InvalidFrequency { .. })),
                "{raw:?} should be rejected"
            );
        }
        assert!("usd".parse::<Currency>().is_err());
        assert!("News".parse::<Category>().is_err());
        assert!("Active".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn test_validate_rejects_capitalised_frequency() {
        let (Some(now), Some(start)) = (at(2026, 1, 2), NaiveDate::from_ymd_opt(2026, 1, 1))
        else {
            return;
        };
        let mut new = input(start);
        new.frequency = "Monthly".to_string();
        let result = new.validate(SubscriptionId::new("s1"), UserId::new("u1"), now);
        assert!(matches!(result, Err(Error::InvalidFrequency { .. })));
    }

    #[test]
    fn test_status_accepts_both_spellings() -> Result<()> {
        assert_eq!("cancelled".parse::<SubscriptionStatus>()?, SubscriptionStatus::Canceled);
        assert_eq!("canceled".parse::<SubscriptionStatus>()?, SubscriptionStatus::Canceled);
        Ok(())
    }

    #[test]
    fn test_validate_derives_renewal_date() -> Result<()> {
        let (Some(now), Some(start)) = (at(2026, 1, 2), NaiveDate::from_ymd_opt(2026, 1, 1))
        else {
            return Ok(());
        };
        let sub = input(start).validate(SubscriptionId::new("s1"), UserId::new("u1"), now)?;
        assert_eq!(sub.renewal_date, NaiveDate::from_ymd_opt(2026, 1, 31).unwrap_or(start));
        assert_eq!(sub.status, SubscriptionStatus::Active);
        Ok(())
    }

    #[test]
    fn test_validate_keeps_explicit_renewal_date() -> Result<()> {
        let (Some(now), Some(start), Some(renewal)) = (
            at(2026, 1, 2),
            NaiveDate::from_ymd_opt(2026, 1, 1),
            NaiveDate::from_ymd_opt(2026, 3, 15),
        ) else {
            return Ok(());
        };
        let mut new = input(start);
        new.renewal_date = Some(renewal);
        let sub = new.validate(SubscriptionId::new("s1"), UserId::new("u1"), now)?;
        assert_eq!(sub.renewal_date, renewal);
        Ok(())
    }

    #[test]
    fn test_validate_expires_past_renewal() -> Result<()> {
        let (Some(now), Some(start)) = (at(2026, 6, 1), NaiveDate::from_ymd_opt(2026, 1, 1))
        else {
            return Ok(());
        };
        let sub = input(start).validate(SubscriptionId::new("s1"), UserId::new("u1"), now)?;
        assert_eq!(sub.status, SubscriptionStatus::Expired);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_future_start_and_bad_fields() {
        let (Some(now), Some(start)) = (at(2026, 1, 1), NaiveDate::from_ymd_opt(2026, 2, 1))
        else {
            return;
        };
        let mut new = input(start);
        new.name = "x".to_string();
        new.currency = "GBP".to_string();
        let result = new.validate(SubscriptionId::new("s1"), UserId::new("u1"), now);
        assert!(matches!(result, Err(Error::Validation { messages }) if messages.len() == 3));
    }

    #[test]
    fn test_validate_rejects_unknown_frequency() {
        let (Some(now), Some(start)) = (at(2026, 1, 2), NaiveDate::from_ymd_opt(2026, 1, 1))
        else {
            return;
        };
        let mut new = input(start);
        new.frequency = "hourly".to_string();
        let result = new.validate(SubscriptionId::new("s1"), UserId::new("u1"), now);
        assert!(matches!(result, Err(Error::InvalidFrequency { .. })));
    }

    #[test]
    fn test_subscription_serializes_camel_case() -> Result<()> {
        let (Some(now), Some(start)) = (at(2026, 1, 2), NaiveDate::from_ymd_opt(2026, 1, 1))
        else {
            return Ok(());
        };
        let sub = input(start).validate(SubscriptionId::new("s1"), UserId::new("u1"), now)?;
        let json = serde_json::to_value(&sub)?;
        assert_eq!(json["renewalDate"], "2026-01-31");
        assert_eq!(json["currency"], "USD");
        assert_eq!(json["status"], "active");
        Ok(())
    }
}
