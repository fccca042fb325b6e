//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed microsecond
//! width and a `Z` suffix, so `<`/`>=` on the text column orders the same
//! way as the instants. UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use masthead_core::{
  identity::Identity,
  paywall::PaywallConfig,
  subscription::{Subscription, SubscriptionStatus},
  view::{ArticleRef, PageView, RequestMeta},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── SubscriptionStatus ──────────────────────────────────────────────────────

pub fn encode_status(s: SubscriptionStatus) -> &'static str { s.into() }

pub fn decode_status(s: &str) -> Result<SubscriptionStatus> {
  SubscriptionStatus::from_str(s).map_err(|_| {
    masthead_core::Error::UnknownSubscriptionStatus(s.to_owned()).into()
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from the `paywall_config` row.
pub struct RawPaywallConfig {
  pub free_article_limit: u32,
  pub reset_period_days:  u32,
  pub updated_at:         String,
}

impl RawPaywallConfig {
  pub fn into_config(self) -> Result<PaywallConfig> {
    Ok(PaywallConfig {
      free_article_limit: self.free_article_limit,
      reset_period_days:  self.reset_period_days,
      updated_at:         decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `subscriptions` row.
pub struct RawSubscription {
  pub user_id:              String,
  pub status:               String,
  pub current_period_start: Option<String>,
  pub current_period_end:   Option<String>,
  pub updated_at:           String,
}

impl RawSubscription {
  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      status:               decode_status(&self.status)?,
      current_period_start: self
        .current_period_start
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      current_period_end:   self
        .current_period_end
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      updated_at:           decode_dt(&self.updated_at)?,
      user_id:              self.user_id,
    })
  }
}

/// Raw strings read directly from a `page_views` row.
pub struct RawPageView {
  pub view_id:       String,
  pub user_id:       Option<String>,
  pub session_id:    Option<String>,
  pub article_id:    String,
  pub article_title: String,
  pub article_url:   String,
  pub ip_address:    Option<String>,
  pub user_agent:    Option<String>,
  pub viewed_at:     String,
}

impl RawPageView {
  pub const COLUMNS: &'static str = "view_id, user_id, session_id, article_id, \
     article_title, article_url, ip_address, user_agent, viewed_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      view_id:       row.get(0)?,
      user_id:       row.get(1)?,
      session_id:    row.get(2)?,
      article_id:    row.get(3)?,
      article_title: row.get(4)?,
      article_url:   row.get(5)?,
      ip_address:    row.get(6)?,
      user_agent:    row.get(7)?,
      viewed_at:     row.get(8)?,
    })
  }

  pub fn into_view(self) -> Result<PageView> {
    let identity = match (self.user_id, self.session_id) {
      (Some(user_id), None) => Identity::User { user_id },
      (None, Some(session_id)) => Identity::Anonymous { session_id },
      _ => return Err(Error::InvalidIdentity(self.view_id)),
    };

    Ok(PageView {
      view_id: decode_uuid(&self.view_id)?,
      identity,
      article: ArticleRef {
        article_id:    self.article_id,
        article_title: self.article_title,
        article_url:   self.article_url,
      },
      meta: RequestMeta {
        ip_address: self.ip_address,
        user_agent: self.user_agent,
      },
      viewed_at: decode_dt(&self.viewed_at)?,
    })
  }
}
