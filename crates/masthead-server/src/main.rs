//! masthead-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered under
//! `MASTHEAD_*` environment variables, opens an in-process SQLite store, and
//! serves the paywall check and admin API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `admin_password_hash`:
//!
//! ```text
//! cargo run -p masthead-server -- --hash-password
//! ```

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use masthead_api::{AppState, ServerConfig};
use masthead_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Masthead paywall metering server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  init_tracing();
  let cli = Cli::parse();

  if cli.hash_password {
    println!("{}", hash_password(&read_password()?)?);
    return Ok(());
  }

  let server_cfg = load_config(cli.config)?;
  if server_cfg.admin_password_hash.trim().is_empty() {
    tracing::warn!("admin_password_hash is empty; the admin API will reject every request");
  }

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  tracing::info!(path = %store_path.display(), "opened metering store");

  let address = server_cfg.address();
  let state = AppState::new(Arc::new(store), server_cfg)
    .context("user_header is not a valid HTTP header name")?;
  let app = masthead_api::router(state)
    .layer(TraceLayer::new_for_http())
    .into_make_service_with_connect_info::<SocketAddr>();

  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("cannot bind {address}"))?;
  tracing::info!(%address, "masthead listening");

  axum::serve(listener, app).await.context("server exited with an error")
}

fn init_tracing() {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Layer `MASTHEAD_*` environment variables over the (optional) TOML file.
fn load_config(path: PathBuf) -> anyhow::Result<ServerConfig> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("MASTHEAD").try_parsing(true))
    .build()
    .context("failed to read configuration")?
    .try_deserialize()
    .context("configuration is incomplete or malformed")
}

fn hash_password(password: &str) -> anyhow::Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
  Ok(hash.to_string())
}

/// Prompt for a password and read one line from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{BufRead, Write};
  eprint!("Password: ");
  std::io::stderr().flush().ok();
  let mut line = String::new();
  std::io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/masthead.db")), PathBuf::from(home).join("masthead.db"));
  }

  #[test]
  fn hashed_password_verifies() {
    use argon2::{PasswordHash, PasswordVerifier};
    let hash = hash_password("hunter2").unwrap();
    let parsed = PasswordHash::new(&hash).unwrap();
    assert!(Argon2::default().verify_password(b"hunter2", &parsed).is_ok());
    assert!(Argon2::default().verify_password(b"hunter3", &parsed).is_err());
  }

  #[test]
  fn plain_path_is_untouched() {
    assert_eq!(expand_tilde(Path::new("/var/lib/masthead.db")), PathBuf::from("/var/lib/masthead.db"));
  }
}
