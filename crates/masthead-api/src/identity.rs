//! Working out who is reading.
//!
//! A signed-in user is identified by the session provider; everyone else
//! gets an anonymous token carried in a long-lived cookie. Resolution never
//! fails: when there is no usable cookie a fresh token is minted and handed
//! back for the response to set.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
  extract::{ConnectInfo, FromRequestParts},
  http::{
    HeaderMap, HeaderName, header,
    header::InvalidHeaderName,
    request::Parts,
  },
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use masthead_core::{identity::Identity, view::RequestMeta};
use uuid::Uuid;

/// Lifetime of the anonymous metering cookie.
pub const ANONYMOUS_COOKIE_MAX_AGE_DAYS: i64 = 30;

// ─── Session provider ────────────────────────────────────────────────────────

/// Source of the signed-in user for a request, if any.
pub trait SessionResolver: Send + Sync {
  fn user_id(&self, headers: &HeaderMap) -> Option<String>;
}

/// Trusts a header set by an authenticating reverse proxy.
///
/// The proxy must strip this header from client requests; the service itself
/// has no way to tell a forged value apart.
#[derive(Debug, Clone)]
pub struct TrustedHeader {
  name: HeaderName,
}

impl TrustedHeader {
  pub fn new(name: &str) -> Result<Self, InvalidHeaderName> {
    Ok(Self { name: HeaderName::try_from(name)? })
  }
}

impl SessionResolver for TrustedHeader {
  fn user_id(&self, headers: &HeaderMap) -> Option<String> {
    headers
      .get(&self.name)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .map(str::to_owned)
  }
}

// ─── Anonymous cookie ────────────────────────────────────────────────────────

/// Issues and reads the anonymous session cookie.
#[derive(Debug, Clone)]
pub struct AnonymousCookie {
  name:   String,
  secure: bool,
}

impl AnonymousCookie {
  pub fn new(name: impl Into<String>, secure: bool) -> Self {
    Self { name: name.into(), secure }
  }

  pub fn name(&self) -> &str { &self.name }

  /// Return the session token from `jar`, minting one if the cookie is
  /// missing or does not hold a UUID. A minted token is added to the
  /// returned jar so the response carries `Set-Cookie`.
  pub fn resolve(&self, jar: CookieJar) -> (String, CookieJar) {
    let existing = jar
      .get(&self.name)
      .map(|c| c.value().to_owned())
      .filter(|v| Uuid::parse_str(v).is_ok());

    match existing {
      Some(token) => (token, jar),
      None => {
        let token = Uuid::new_v4().to_string();
        let jar = jar.add(self.build(token.clone()));
        (token, jar)
      }
    }
  }

  fn build(&self, token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(self.name.clone(), token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(self.secure);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(time::Duration::days(ANONYMOUS_COOKIE_MAX_AGE_DAYS));
    cookie
  }
}

/// Resolve the request's identity. The cookie is only consulted (or issued)
/// for anonymous readers.
pub fn resolve_identity(
  sessions: &dyn SessionResolver,
  cookie: &AnonymousCookie,
  headers: &HeaderMap,
  jar: CookieJar,
) -> (Identity, CookieJar) {
  if let Some(user_id) = sessions.user_id(headers) {
    return (Identity::User { user_id }, jar);
  }
  let (session_id, jar) = cookie.resolve(jar);
  (Identity::Anonymous { session_id }, jar)
}

// ─── Request metadata ────────────────────────────────────────────────────────

/// Extracts the client address and user agent recorded with each view.
///
/// The address prefers `X-Forwarded-For` (first hop), then `X-Real-IP`, then
/// the socket peer when the server was started with connect info.
pub struct ClientMeta(pub RequestMeta);

impl<S> FromRequestParts<S> for ClientMeta
where
  S: Send + Sync,
{
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    Ok(ClientMeta(request_meta(&parts.headers, &parts.extensions)))
  }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
}

fn request_meta(headers: &HeaderMap, extensions: &axum::http::Extensions) -> RequestMeta {
  let forwarded = header_str(headers, "x-forwarded-for")
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|v| !v.is_empty());

  let ip_address = forwarded
    .or_else(|| header_str(headers, "x-real-ip"))
    .map(str::to_owned)
    .or_else(|| {
      extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
    });

  let user_agent = headers
    .get(header::USER_AGENT)
    .and_then(|v| v.to_str().ok())
    .map(str::to_owned);

  RequestMeta { ip_address, user_agent }
}
