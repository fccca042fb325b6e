//! The metering decision and its fail-open policy.
//!
//! [`decide`] is a pure function of entitlement, prior view count and the
//! configured limit. Nothing about a reader's paywall state is stored; it is
//! recomputed from the view log on every request.
//!
//! Infrastructure failures on the way to a decision surface as
//! [`MeteringError`] and are turned into safe values by [`recover`], the
//! only place the fail-open mapping lives:
//!
//! | Stage        | Safe default                        |
//! |--------------|-------------------------------------|
//! | config       | built-in defaults (3 views / 30 d)  |
//! | entitlement  | not a subscriber (metered)          |
//! | view count   | zero prior views (allow)            |
//!
//! A failed view write never reaches `recover`; it is logged and the
//! already-computed decision stands.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::paywall::PaywallConfig;

// ─── Decision ────────────────────────────────────────────────────────────────

/// Whether the reader gets unmetered access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
  Subscriber,
  Metered,
}

/// Views already counted for an identity inside the current window, not
/// including the view being decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorViews(pub u64);

/// The answer handed back to the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
  pub blocked:       bool,
  /// Views in the window including this one; always 0 for subscribers.
  pub count:         u64,
  pub limit:         u32,
  pub is_subscriber: bool,
}

/// Apply the limit. The boundary is inclusive: a reader gets exactly
/// `limit` free views and the next one is blocked.
pub fn decide(entitlement: Entitlement, prior: PriorViews, limit: u32) -> Decision {
  match entitlement {
    Entitlement::Subscriber => Decision {
      blocked: false,
      count: 0,
      limit,
      is_subscriber: true,
    },
    Entitlement::Metered => Decision {
      blocked:       prior.0 >= u64::from(limit),
      count:         prior.0.saturating_add(1),
      limit,
      is_subscriber: false,
    },
  }
}

// ─── Failures ────────────────────────────────────────────────────────────────

/// The datastore call a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
  Config,
  Entitlement,
  ViewCount,
  RecordView,
}

#[derive(Debug, Error)]
pub enum MeteringError {
  #[error("{stage} failed: {source}")]
  Store {
    stage:  Stage,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("{stage} timed out after {after:?}")]
  Timeout { stage: Stage, after: Duration },
}

impl MeteringError {
  pub fn stage(&self) -> Stage {
    match self {
      Self::Store { stage, .. } | Self::Timeout { stage, .. } => *stage,
    }
  }
}

// ─── Fail-open policy ────────────────────────────────────────────────────────

/// The value a stage falls back to when its lookup fails. Every default
/// leans towards showing content rather than the paywall.
pub trait SafeDefault {
  fn safe_default() -> Self;
}

impl SafeDefault for Entitlement {
  fn safe_default() -> Self { Self::Metered }
}

impl SafeDefault for PriorViews {
  fn safe_default() -> Self { Self(0) }
}

impl SafeDefault for PaywallConfig {
  fn safe_default() -> Self { Self::defaults(Utc::now()) }
}

/// Unwrap a stage result, logging and substituting the safe default on
/// failure.
pub fn recover<T: SafeDefault>(result: Result<T, MeteringError>) -> T {
  match result {
    Ok(value) => value,
    Err(err) => {
      tracing::warn!(stage = %err.stage(), error = %err, "metering lookup failed, using safe default");
      T::safe_default()
    }
  }
}
