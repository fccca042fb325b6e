//! Who is reading: a signed-in user or an anonymous cookie session.

use serde::{Deserialize, Serialize};

/// The identity a view is counted against.
///
/// Exactly one key is ever set for a view, so the two kinds are separate
/// variants rather than a pair of optional fields. Counts never cross
/// variants: an anonymous session's views are not inherited by the user it
/// later signs in as.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
  /// Authenticated reader, keyed by the session provider's user id.
  User { user_id: String },
  /// Anonymous reader, keyed by the opaque token in the metering cookie.
  Anonymous { session_id: String },
}

impl Identity {
  pub fn user(user_id: impl Into<String>) -> Self {
    Self::User { user_id: user_id.into() }
  }

  pub fn anonymous(session_id: impl Into<String>) -> Self {
    Self::Anonymous { session_id: session_id.into() }
  }

  pub fn user_id(&self) -> Option<&str> {
    match self {
      Self::User { user_id } => Some(user_id),
      Self::Anonymous { .. } => None,
    }
  }

  pub fn session_id(&self) -> Option<&str> {
    match self {
      Self::User { .. } => None,
      Self::Anonymous { session_id } => Some(session_id),
    }
  }

  pub fn is_anonymous(&self) -> bool { matches!(self, Self::Anonymous { .. }) }
}
