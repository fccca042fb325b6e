//! The `MeterStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `masthead-store-sqlite`). Higher layers (`masthead-api`) depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  identity::Identity,
  paywall::{PaywallConfig, PaywallConfigUpdate},
  subscription::{NewSubscription, Subscription},
  view::{NewPageView, PageView},
};

/// Default page size for [`MeterStore::list_views`].
pub const DEFAULT_VIEW_PAGE: usize = 100;
/// Largest page [`MeterStore::list_views`] will return.
pub const MAX_VIEW_PAGE: usize = 1000;

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`MeterStore::list_views`]. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
  pub identity:   Option<Identity>,
  pub article_id: Option<String>,
  /// Inclusive lower bound on `viewed_at`.
  pub since:      Option<DateTime<Utc>>,
  /// Exclusive upper bound on `viewed_at`.
  pub until:      Option<DateTime<Utc>>,
  /// Clamped to [`MAX_VIEW_PAGE`]; defaults to [`DEFAULT_VIEW_PAGE`].
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

impl ViewQuery {
  pub fn page_size(&self) -> usize {
    self.limit.unwrap_or(DEFAULT_VIEW_PAGE).min(MAX_VIEW_PAGE)
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the metering datastore.
///
/// The view log is append-only: there is no method to update or delete a
/// view. Subscriptions are written by billing (or an administrator) and only
/// read while metering.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MeterStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Paywall configuration ─────────────────────────────────────────────

  /// Return the configuration row, inserting the defaults if none exists.
  /// Repeated calls never create a second row.
  fn get_or_create_paywall_config(
    &self,
  ) -> impl Future<Output = Result<PaywallConfig, Self::Error>> + Send + '_;

  /// Overwrite the configuration row (creating it if needed).
  fn update_paywall_config(
    &self,
    update: PaywallConfigUpdate,
  ) -> impl Future<Output = Result<PaywallConfig, Self::Error>> + Send + '_;

  // ── Subscriptions ─────────────────────────────────────────────────────

  /// The user's subscription, or `None` if they have never had one.
  fn find_subscription(
    &self,
    user_id: String,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  /// Insert or replace the user's subscription.
  fn upsert_subscription(
    &self,
    input: NewSubscription,
  ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send + '_;

  // ── View log ──────────────────────────────────────────────────────────

  /// Count views keyed by exactly this identity with `viewed_at >= since`.
  fn count_views(
    &self,
    identity: Identity,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Append a view and return the persisted [`PageView`].
  fn record_view(
    &self,
    input: NewPageView,
  ) -> impl Future<Output = Result<PageView, Self::Error>> + Send + '_;

  /// Page through the view log, newest first.
  fn list_views<'a>(
    &'a self,
    query: &'a ViewQuery,
  ) -> impl Future<Output = Result<Vec<PageView>, Self::Error>> + Send + 'a;
}
