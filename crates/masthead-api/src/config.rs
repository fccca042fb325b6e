//! Runtime server configuration, deserialised from `config.toml` and
//! `MASTHEAD_*` environment variables.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                  String,
  #[serde(default = "default_port")]
  pub port:                  u16,
  #[serde(default = "default_store_path")]
  pub store_path:            PathBuf,
  pub admin_username:        String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub admin_password_hash:   String,
  /// Header an upstream authenticating proxy sets to the signed-in user id.
  #[serde(default = "default_user_header")]
  pub user_header:           String,
  #[serde(default = "default_cookie_name")]
  pub cookie_name:           String,
  #[serde(default)]
  pub cookie_secure:         bool,
  /// Upper bound on each datastore call made while metering.
  #[serde(default = "default_store_timeout_ms")]
  pub store_timeout_ms:      u64,
  /// How long a fetched paywall config is reused before re-reading.
  #[serde(default = "default_config_cache_ttl_secs")]
  pub config_cache_ttl_secs: u64,
}

impl ServerConfig {
  /// A configuration with every default applied and the given admin
  /// credentials.
  pub fn new(admin_username: impl Into<String>, admin_password_hash: impl Into<String>) -> Self {
    Self {
      host:                  default_host(),
      port:                  default_port(),
      store_path:            default_store_path(),
      admin_username:        admin_username.into(),
      admin_password_hash:   admin_password_hash.into(),
      user_header:           default_user_header(),
      cookie_name:           default_cookie_name(),
      cookie_secure:         false,
      store_timeout_ms:      default_store_timeout_ms(),
      config_cache_ttl_secs: default_config_cache_ttl_secs(),
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn store_timeout(&self) -> Duration { Duration::from_millis(self.store_timeout_ms) }

  pub fn config_cache_ttl(&self) -> Duration { Duration::from_secs(self.config_cache_ttl_secs) }
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("masthead.db") }

fn default_user_header() -> String { "x-authenticated-user".to_owned() }

fn default_cookie_name() -> String { "masthead_anon".to_owned() }

fn default_store_timeout_ms() -> u64 { 2000 }

fn default_config_cache_ttl_secs() -> u64 { 30 }
