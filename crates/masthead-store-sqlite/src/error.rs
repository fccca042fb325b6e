//! Error type for `masthead-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] masthead_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A `page_views` row with neither or both identity keys set.
  #[error("page view {0} has no single identity key")]
  InvalidIdentity(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
