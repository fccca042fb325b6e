//! Subscriptions, owned by billing, read by the meter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Billing state of a user's subscription.
///
/// The string forms (`ACTIVE`, `PAST_DUE`, ...) are what billing writes and
/// what the store persists.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
  Active,
  Inactive,
  PastDue,
  Canceled,
  Trialing,
}

impl SubscriptionStatus {
  /// Only an active subscription grants unmetered access. Trials, past-due
  /// and cancelled accounts are metered like everyone else.
  pub fn is_entitled(self) -> bool { matches!(self, Self::Active) }
}

/// One user's subscription (at most one per user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
  pub user_id:              String,
  pub status:               SubscriptionStatus,
  pub current_period_start: Option<DateTime<Utc>>,
  pub current_period_end:   Option<DateTime<Utc>>,
  pub updated_at:           DateTime<Utc>,
}

/// Input to [`crate::store::MeterStore::upsert_subscription`].
#[derive(Debug, Clone)]
pub struct NewSubscription {
  pub user_id:              String,
  pub status:               SubscriptionStatus,
  pub current_period_start: Option<DateTime<Utc>>,
  pub current_period_end:   Option<DateTime<Utc>>,
}

impl NewSubscription {
  /// Convenience constructor with no billing period.
  pub fn new(user_id: impl Into<String>, status: SubscriptionStatus) -> Self {
    Self {
      user_id: user_id.into(),
      status,
      current_period_start: None,
      current_period_end: None,
    }
  }
}
