//! Page views: the append-only event log the meter counts over.
//!
//! A view is recorded for every gated render, including the one that gets
//! blocked. Views are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, identity::Identity};

/// Upper bound on any single article field, in characters.
pub const MAX_ARTICLE_FIELD_LEN: usize = 2048;

// ─── Article ─────────────────────────────────────────────────────────────────

/// The piece of content being read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
  pub article_id:    String,
  pub article_title: String,
  pub article_url:   String,
}

impl ArticleRef {
  /// Reject blank or oversized fields. Surrounding whitespace is trimmed on
  /// the returned value.
  pub fn validated(self) -> Result<Self> {
    Ok(Self {
      article_id:    check_field("article_id", self.article_id)?,
      article_title: check_field("article_title", self.article_title)?,
      article_url:   check_field("article_url", self.article_url)?,
    })
  }
}

fn check_field(name: &str, value: String) -> Result<String> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(Error::InvalidArticle(format!("{name} must not be empty")));
  }
  if trimmed.chars().count() > MAX_ARTICLE_FIELD_LEN {
    return Err(Error::InvalidArticle(format!(
      "{name} exceeds {MAX_ARTICLE_FIELD_LEN} characters"
    )));
  }
  Ok(trimmed.to_owned())
}

// ─── Request metadata ────────────────────────────────────────────────────────

/// Audit details captured from the inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
  pub ip_address: Option<String>,
  pub user_agent: Option<String>,
}

// ─── PageView ────────────────────────────────────────────────────────────────

/// One persisted content-access event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageView {
  pub view_id:   Uuid,
  pub identity:  Identity,
  pub article:   ArticleRef,
  pub meta:      RequestMeta,
  pub viewed_at: DateTime<Utc>,
}

/// Input to [`crate::store::MeterStore::record_view`].
///
/// `viewed_at` comes from the meter's clock, never from the HTTP client.
#[derive(Debug, Clone)]
pub struct NewPageView {
  pub identity:  Identity,
  pub article:   ArticleRef,
  pub meta:      RequestMeta,
  pub viewed_at: DateTime<Utc>,
}
