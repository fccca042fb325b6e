//! Handler for `POST /paywall/check`.
//!
//! Called by the rendering layer before it shows gated content. The body
//! names the article; identity comes from the session header or the
//! anonymous cookie, which is issued here when missing.

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  http::HeaderMap,
};
use axum_extra::extract::cookie::CookieJar;
use masthead_core::{policy::Decision, store::MeterStore, view::ArticleRef};
use serde::Deserialize;

use crate::{
  AppState,
  error::ApiError,
  identity::{ClientMeta, resolve_identity},
};

/// JSON body accepted by `POST /paywall/check`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckBody {
  pub article_id:    String,
  pub article_title: String,
  pub article_url:   String,
}

impl From<CheckBody> for ArticleRef {
  fn from(b: CheckBody) -> Self {
    ArticleRef {
      article_id:    b.article_id,
      article_title: b.article_title,
      article_url:   b.article_url,
    }
  }
}

/// `POST /paywall/check`: body `{"articleId","articleTitle","articleUrl"}`,
/// returns `{"blocked","count","limit","isSubscriber"}`.
pub async fn check<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  jar: CookieJar,
  ClientMeta(meta): ClientMeta,
  body: Result<Json<CheckBody>, JsonRejection>,
) -> Result<(CookieJar, Json<Decision>), ApiError>
where
  S: MeterStore + 'static,
{
  let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let article = ArticleRef::from(body)
    .validated()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let (identity, jar) =
    resolve_identity(state.sessions.as_ref(), &state.cookie, &headers, jar);
  let decision = state.meter.check_and_record(identity, article, meta).await;

  Ok((jar, Json(decision)))
}
