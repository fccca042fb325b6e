//! The paywall configuration singleton.
//!
//! One row, created with defaults on first read, edited by administrators,
//! never deleted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_FREE_ARTICLE_LIMIT: u32 = 3;
pub const DEFAULT_RESET_PERIOD_DAYS: u32 = 30;
/// Longest accepted reset window (ten years).
pub const MAX_RESET_PERIOD_DAYS: u32 = 3650;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaywallConfig {
  /// Free views allowed inside one window. Zero means every view is gated.
  pub free_article_limit: u32,
  /// Length of the trailing window, in days.
  pub reset_period_days:  u32,
  pub updated_at:         DateTime<Utc>,
}

impl PaywallConfig {
  /// The defaults a fresh installation starts with.
  pub fn defaults(now: DateTime<Utc>) -> Self {
    Self {
      free_article_limit: DEFAULT_FREE_ARTICLE_LIMIT,
      reset_period_days:  DEFAULT_RESET_PERIOD_DAYS,
      updated_at:         now,
    }
  }

  /// Start of the trailing window ending at `now`. Views at or after this
  /// instant are counted.
  pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    now
      .checked_sub_signed(Duration::days(i64::from(self.reset_period_days)))
      .unwrap_or(DateTime::<Utc>::MIN_UTC)
  }
}

/// Input to [`crate::store::MeterStore::update_paywall_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaywallConfigUpdate {
  pub free_article_limit: u32,
  pub reset_period_days:  u32,
}

impl PaywallConfigUpdate {
  pub fn validate(&self) -> Result<()> {
    if self.reset_period_days == 0 {
      return Err(Error::InvalidConfig(
        "reset_period_days must be at least 1".into(),
      ));
    }
    if self.reset_period_days > MAX_RESET_PERIOD_DAYS {
      return Err(Error::InvalidConfig(format!(
        "reset_period_days must be at most {MAX_RESET_PERIOD_DAYS}"
      )));
    }
    Ok(())
  }
}
