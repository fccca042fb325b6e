//! Error types for `masthead-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid article reference: {0}")]
  InvalidArticle(String),

  #[error("invalid paywall configuration: {0}")]
  InvalidConfig(String),

  #[error("unknown subscription status: {0:?}")]
  UnknownSubscriptionStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
