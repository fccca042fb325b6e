//! HTTP surface for Masthead.
//!
//! Exposes an axum [`Router`] backed by any [`masthead_core::store::MeterStore`]:
//! the public `POST /paywall/check` endpoint used by the article renderer, and
//! a Basic-auth protected `/admin` back office. TLS and the listener are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let state = masthead_api::AppState::new(Arc::new(store), config)?;
//! axum::serve(listener, masthead_api::router(state)).await?;
//! ```

pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod meter;
pub mod paywall;

use std::sync::Arc;

use axum::{
  Router,
  http::header::InvalidHeaderName,
  routing::{get, post},
};
use masthead_core::{
  clock::{Clock, SystemClock},
  store::MeterStore,
};

pub use auth::AuthConfig;
pub use config::ServerConfig;
pub use error::ApiError;
use identity::{AnonymousCookie, SessionResolver, TrustedHeader};
use meter::{Meter, MeterSettings};

// ─── Shared state ────────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub meter:    Arc<Meter<S>>,
  pub config:   Arc<ServerConfig>,
  pub auth:     Arc<AuthConfig>,
  pub sessions: Arc<dyn SessionResolver>,
  pub cookie:   Arc<AnonymousCookie>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      meter:    Arc::clone(&self.meter),
      config:   Arc::clone(&self.config),
      auth:     Arc::clone(&self.auth),
      sessions: Arc::clone(&self.sessions),
      cookie:   Arc::clone(&self.cookie),
    }
  }
}

impl<S: MeterStore> AppState<S> {
  /// Build state using the wall clock. Fails only if `config.user_header`
  /// is not a valid header name.
  pub fn new(store: Arc<S>, config: ServerConfig) -> Result<Self, InvalidHeaderName> {
    Self::with_clock(store, config, Arc::new(SystemClock))
  }

  pub fn with_clock(
    store: Arc<S>,
    config: ServerConfig,
    clock: Arc<dyn Clock>,
  ) -> Result<Self, InvalidHeaderName> {
    let sessions = TrustedHeader::new(&config.user_header)?;
    let settings = MeterSettings {
      store_timeout: config.store_timeout(),
      config_ttl:    config.config_cache_ttl(),
    };

    Ok(Self {
      meter: Arc::new(Meter::new(Arc::clone(&store), clock, settings)),
      auth: Arc::new(AuthConfig {
        username:      config.admin_username.clone(),
        password_hash: config.admin_password_hash.clone(),
      }),
      sessions: Arc::new(sessions),
      cookie: Arc::new(AnonymousCookie::new(config.cookie_name.clone(), config.cookie_secure)),
      config: Arc::new(config),
      store,
    })
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: MeterStore + 'static,
{
  Router::new()
    // Public
    .route("/paywall/check", post(paywall::check::<S>))
    // Admin
    .route(
      "/admin/paywall",
      get(admin::get_paywall::<S>).put(admin::put_paywall::<S>),
    )
    .route("/admin/views", get(admin::list_views::<S>))
    .route(
      "/admin/subscriptions/{user_id}",
      get(admin::get_subscription::<S>).put(admin::put_subscription::<S>),
    )
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, Response, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use chrono::DateTime;
  use masthead_core::{
    identity::Identity,
    subscription::{NewSubscription, SubscriptionStatus},
  };
  use masthead_store_sqlite::SqliteStore;
  use rand_core::OsRng;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  use super::*;

  async fn make_state(password: &str) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let salt  = SaltString::generate(&mut OsRng);
    let hash  = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();

    AppState::new(Arc::new(store), ServerConfig::new("editor", hash)).unwrap()
  }

  fn auth_header(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  async fn send(
    state:   &AppState<SqliteStore>,
    method:  &str,
    uri:     &str,
    headers: Vec<(&str, &str)>,
    body:    Option<Value>,
  ) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    router(state.clone()).oneshot(builder.body(body).unwrap()).await.unwrap()
  }

  async fn json_body(resp: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn article(id: &str) -> Value {
    json!({
      "articleId": id,
      "articleTitle": format!("Story {id}"),
      "articleUrl": format!("https://news.example/{id}"),
    })
  }

  /// `name=value` from a `Set-Cookie` header, ready to send back as `Cookie`.
  fn issued_cookie(resp: &Response<Body>) -> Option<String> {
    resp
      .headers()
      .get(header::SET_COOKIE)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.split(';').next())
      .map(str::to_owned)
  }

  // ── POST /paywall/check ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn anonymous_reader_is_blocked_after_three_articles() {
    let state = make_state("secret").await;

    let first = send(&state, "POST", "/paywall/check", vec![], Some(article("a1"))).await;
    assert_eq!(first.status(), StatusCode::OK);
    let cookie = issued_cookie(&first).expect("anonymous cookie issued");
    assert!(cookie.starts_with("masthead_anon="));
    assert_eq!(
      json_body(first).await,
      json!({ "blocked": false, "count": 1, "limit": 3, "isSubscriber": false })
    );

    for (id, count) in [("a2", 2), ("a3", 3)] {
      let resp = send(
        &state,
        "POST",
        "/paywall/check",
        vec![("cookie", cookie.as_str())],
        Some(article(id)),
      )
      .await;
      assert!(issued_cookie(&resp).is_none(), "cookie reissued on request {count}");
      let body = json_body(resp).await;
      assert_eq!(body["blocked"], false);
      assert_eq!(body["count"], count);
    }

    let fourth = send(
      &state,
      "POST",
      "/paywall/check",
      vec![("cookie", cookie.as_str())],
      Some(article("a4")),
    )
    .await;
    assert_eq!(
      json_body(fourth).await,
      json!({ "blocked": true, "count": 4, "limit": 3, "isSubscriber": false })
    );

    // The blocked attempt is still recorded.
    let session_id = cookie.trim_start_matches("masthead_anon=");
    let views = state
      .store
      .count_views(Identity::anonymous(session_id), DateTime::UNIX_EPOCH)
      .await
      .unwrap();
    assert_eq!(views, 4);
  }

  #[tokio::test]
  async fn active_subscriber_is_never_blocked() {
    let state = make_state("secret").await;
    state
      .store
      .upsert_subscription(NewSubscription::new("sub-1", SubscriptionStatus::Active))
      .await
      .unwrap();

    for id in ["a1", "a2", "a3", "a4", "a5"] {
      let resp = send(
        &state,
        "POST",
        "/paywall/check",
        vec![("x-authenticated-user", "sub-1")],
        Some(article(id)),
      )
      .await;
      assert!(issued_cookie(&resp).is_none());
      assert_eq!(
        json_body(resp).await,
        json!({ "blocked": false, "count": 0, "limit": 3, "isSubscriber": true })
      );
    }

    let views = state
      .store
      .count_views(Identity::user("sub-1"), DateTime::UNIX_EPOCH)
      .await
      .unwrap();
    assert_eq!(views, 5);
  }

  #[tokio::test]
  async fn signed_in_reader_is_metered_by_user_id() {
    let state = make_state("secret").await;
    state
      .store
      .upsert_subscription(NewSubscription::new("lapsed", SubscriptionStatus::PastDue))
      .await
      .unwrap();

    let resp = send(
      &state,
      "POST",
      "/paywall/check",
      vec![("x-authenticated-user", "lapsed")],
      Some(article("a1")),
    )
    .await;
    assert!(issued_cookie(&resp).is_none());
    let body = json_body(resp).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["isSubscriber"], false);
  }

  #[tokio::test]
  async fn invalid_check_body_is_rejected() {
    let state = make_state("secret").await;

    let blank = send(&state, "POST", "/paywall/check", vec![], Some(article("  "))).await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(blank).await["error"].is_string());

    let missing = send(
      &state,
      "POST",
      "/paywall/check",
      vec![],
      Some(json!({ "articleId": "a1" })),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let views = state
      .store
      .list_views(&masthead_core::store::ViewQuery::default())
      .await
      .unwrap();
    assert!(views.is_empty(), "rejected requests must not be recorded");
  }

  // ── /admin ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn admin_requires_credentials() {
    let state = make_state("secret").await;

    let anon = send(&state, "GET", "/admin/paywall", vec![], None).await;
    assert_eq!(anon.status(), StatusCode::UNAUTHORIZED);
    assert!(anon.headers().contains_key(header::WWW_AUTHENTICATE));

    let wrong = auth_header("editor", "guess");
    let resp  = send(&state, "GET", "/admin/paywall", vec![("authorization", &wrong)], None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let right = auth_header("editor", "secret");
    let resp  = send(&state, "GET", "/admin/paywall", vec![("authorization", &right)], None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["free_article_limit"], 3);
    assert_eq!(body["reset_period_days"], 30);
  }

  #[tokio::test]
  async fn admin_limit_change_applies_to_next_check() {
    let state = make_state("secret").await;
    let auth  = auth_header("editor", "secret");

    let first = send(&state, "POST", "/paywall/check", vec![], Some(article("a1"))).await;
    let cookie = issued_cookie(&first).unwrap();

    let resp = send(
      &state,
      "PUT",
      "/admin/paywall",
      vec![("authorization", &auth)],
      Some(json!({ "free_article_limit": 1, "reset_period_days": 7 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["free_article_limit"], 1);

    let second = send(
      &state,
      "POST",
      "/paywall/check",
      vec![("cookie", cookie.as_str())],
      Some(article("a2")),
    )
    .await;
    assert_eq!(
      json_body(second).await,
      json!({ "blocked": true, "count": 2, "limit": 1, "isSubscriber": false })
    );
  }

  #[tokio::test]
  async fn admin_rejects_invalid_paywall_config() {
    let state = make_state("secret").await;
    let auth  = auth_header("editor", "secret");

    let resp = send(
      &state,
      "PUT",
      "/admin/paywall",
      vec![("authorization", &auth)],
      Some(json!({ "free_article_limit": 3, "reset_period_days": 0 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let current = state.store.get_or_create_paywall_config().await.unwrap();
    assert_eq!(current.reset_period_days, 30);
  }

  #[tokio::test]
  async fn admin_lists_views_by_identity() {
    let state = make_state("secret").await;
    let auth  = auth_header("editor", "secret");

    for id in ["a1", "a2"] {
      send(
        &state,
        "POST",
        "/paywall/check",
        vec![("x-authenticated-user", "reader-1"), ("user-agent", "Reader/2.0")],
        Some(article(id)),
      )
      .await;
    }
    send(&state, "POST", "/paywall/check", vec![], Some(article("a3"))).await;

    let resp = send(
      &state,
      "GET",
      "/admin/views?user_id=reader-1",
      vec![("authorization", &auth)],
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let views = json_body(resp).await;
    let views = views.as_array().unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0]["article"]["article_id"], "a2", "newest first");
    assert_eq!(views[0]["meta"]["user_agent"], "Reader/2.0");

    let both = send(
      &state,
      "GET",
      "/admin/views?user_id=reader-1&session_id=abc",
      vec![("authorization", &auth)],
      None,
    )
    .await;
    assert_eq!(both.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn admin_grants_complimentary_subscription() {
    let state = make_state("secret").await;
    let auth  = auth_header("editor", "secret");

    let missing = send(
      &state,
      "GET",
      "/admin/subscriptions/guest",
      vec![("authorization", &auth)],
      None,
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let resp = send(
      &state,
      "PUT",
      "/admin/subscriptions/guest",
      vec![("authorization", &auth)],
      Some(json!({ "status": "ACTIVE" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "ACTIVE");

    let check = send(
      &state,
      "POST",
      "/paywall/check",
      vec![("x-authenticated-user", "guest")],
      Some(article("a1")),
    )
    .await;
    assert_eq!(json_body(check).await["isSubscriber"], true);
  }
}
