//! Handlers for the `/admin` back office. Every route requires Basic auth.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/admin/paywall` | Created with defaults if absent |
//! | `PUT`  | `/admin/paywall` | Body: `{"free_article_limit":5,"reset_period_days":30}` |
//! | `GET`  | `/admin/views` | Filters: `user_id`, `session_id`, `article_id`, `since`, `until`, `limit`, `offset` |
//! | `GET`  | `/admin/subscriptions/{user_id}` | 404 if absent |
//! | `PUT`  | `/admin/subscriptions/{user_id}` | Body: `{"status":"ACTIVE"}` |

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
};
use chrono::{DateTime, Utc};
use masthead_core::{
  identity::Identity,
  paywall::{PaywallConfig, PaywallConfigUpdate},
  store::{MeterStore, ViewQuery},
  subscription::{NewSubscription, Subscription, SubscriptionStatus},
  view::PageView,
};
use serde::Deserialize;

use crate::{AppState, auth::Authenticated, error::ApiError};

fn bad_json(e: JsonRejection) -> ApiError { ApiError::BadRequest(e.body_text()) }

// ─── Paywall config ──────────────────────────────────────────────────────────

/// `GET /admin/paywall`
pub async fn get_paywall<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
) -> Result<Json<PaywallConfig>, ApiError>
where
  S: MeterStore + 'static,
{
  let config = state
    .store
    .get_or_create_paywall_config()
    .await
    .map_err(ApiError::store)?;
  Ok(Json(config))
}

/// `PUT /admin/paywall`
pub async fn put_paywall<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  body: Result<Json<PaywallConfigUpdate>, JsonRejection>,
) -> Result<Json<PaywallConfig>, ApiError>
where
  S: MeterStore + 'static,
{
  let Json(update) = body.map_err(bad_json)?;
  update
    .validate()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let config = state
    .meter
    .update_paywall_config(update)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(config))
}

// ─── View log ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ViewParams {
  pub user_id:    Option<String>,
  pub session_id: Option<String>,
  pub article_id: Option<String>,
  pub since:      Option<DateTime<Utc>>,
  pub until:      Option<DateTime<Utc>>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

impl TryFrom<ViewParams> for ViewQuery {
  type Error = ApiError;

  fn try_from(p: ViewParams) -> Result<Self, Self::Error> {
    let identity = match (p.user_id, p.session_id) {
      (Some(_), Some(_)) => {
        return Err(ApiError::BadRequest(
          "filter by user_id or session_id, not both".to_owned(),
        ));
      }
      (Some(user_id), None) => Some(Identity::User { user_id }),
      (None, Some(session_id)) => Some(Identity::Anonymous { session_id }),
      (None, None) => None,
    };

    Ok(ViewQuery {
      identity,
      article_id: p.article_id,
      since: p.since,
      until: p.until,
      limit: p.limit,
      offset: p.offset,
    })
  }
}

/// `GET /admin/views[?user_id=…|session_id=…][&article_id=…][&since=…][&until=…][&limit=…][&offset=…]`
pub async fn list_views<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  params: Result<Query<ViewParams>, QueryRejection>,
) -> Result<Json<Vec<PageView>>, ApiError>
where
  S: MeterStore + 'static,
{
  let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let query = ViewQuery::try_from(params)?;

  let views = state
    .store
    .list_views(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(views))
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

/// `GET /admin/subscriptions/{user_id}`
pub async fn get_subscription<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(user_id): Path<String>,
) -> Result<Json<Subscription>, ApiError>
where
  S: MeterStore + 'static,
{
  let subscription = state
    .store
    .find_subscription(user_id.clone())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("no subscription for user {user_id}")))?;
  Ok(Json(subscription))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionBody {
  pub status:               SubscriptionStatus,
  #[serde(default)]
  pub current_period_start: Option<DateTime<Utc>>,
  #[serde(default)]
  pub current_period_end:   Option<DateTime<Utc>>,
}

/// `PUT /admin/subscriptions/{user_id}`: manual grant or override.
pub async fn put_subscription<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(user_id): Path<String>,
  body: Result<Json<SubscriptionBody>, JsonRejection>,
) -> Result<Json<Subscription>, ApiError>
where
  S: MeterStore + 'static,
{
  let Json(body) = body.map_err(bad_json)?;

  let user_id = user_id.trim().to_owned();
  if user_id.is_empty() {
    return Err(ApiError::BadRequest("user_id must not be blank".to_owned()));
  }
  if let (Some(start), Some(end)) = (body.current_period_start, body.current_period_end) {
    if start > end {
      return Err(ApiError::BadRequest(
        "current_period_start is after current_period_end".to_owned(),
      ));
    }
  }

  let subscription = state
    .store
    .upsert_subscription(NewSubscription {
      user_id,
      status: body.status,
      current_period_start: body.current_period_start,
      current_period_end: body.current_period_end,
    })
    .await
    .map_err(ApiError::store)?;

  tracing::info!(
    user_id = %subscription.user_id,
    status = %subscription.status,
    "subscription set by administrator"
  );
  Ok(Json(subscription))
}
