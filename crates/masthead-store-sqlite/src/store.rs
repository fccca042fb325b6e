//! [`SqliteStore`], the SQLite implementation of [`MeterStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use masthead_core::{
  identity::Identity,
  paywall::{
    DEFAULT_FREE_ARTICLE_LIMIT, DEFAULT_RESET_PERIOD_DAYS, PaywallConfig,
    PaywallConfigUpdate,
  },
  store::{MeterStore, ViewQuery},
  subscription::{NewSubscription, Subscription},
  view::{NewPageView, PageView},
};

use crate::{
  Result,
  encode::{
    RawPageView, RawPaywallConfig, RawSubscription, encode_dt, encode_status,
    encode_uuid,
  },
  schema::SCHEMA,
};

const SELECT_CONFIG: &str =
  "SELECT free_article_limit, reset_period_days, updated_at FROM paywall_config WHERE id = 1";

const SELECT_SUBSCRIPTION: &str = "SELECT user_id, status, current_period_start, \
   current_period_end, updated_at FROM subscriptions WHERE user_id = ?1";

fn read_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPaywallConfig> {
  Ok(RawPaywallConfig {
    free_article_limit: row.get(0)?,
    reset_period_days:  row.get(1)?,
    updated_at:         row.get(2)?,
  })
}

fn read_subscription(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSubscription> {
  Ok(RawSubscription {
    user_id:              row.get(0)?,
    status:               row.get(1)?,
    current_period_start: row.get(2)?,
    current_period_end:   row.get(3)?,
    updated_at:           row.get(4)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A metering store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  #[cfg(test)]
  pub(crate) fn conn_for_tests(&self) -> &tokio_rusqlite::Connection { &self.conn }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── MeterStore impl ─────────────────────────────────────────────────────────

impl MeterStore for SqliteStore {
  type Error = crate::Error;

  // ── Paywall configuration ─────────────────────────────────────────────────

  async fn get_or_create_paywall_config(&self) -> Result<PaywallConfig> {
    let now_str = encode_dt(Utc::now());

    let raw: RawPaywallConfig = self
      .conn
      .call(move |conn| {
        // INSERT OR IGNORE keeps this idempotent under concurrent first reads.
        conn.execute(
          "INSERT OR IGNORE INTO paywall_config
             (id, free_article_limit, reset_period_days, updated_at)
           VALUES (1, ?1, ?2, ?3)",
          rusqlite::params![
            DEFAULT_FREE_ARTICLE_LIMIT,
            DEFAULT_RESET_PERIOD_DAYS,
            now_str
          ],
        )?;
        Ok(conn.query_row(SELECT_CONFIG, [], read_config)?)
      })
      .await?;

    raw.into_config()
  }

  async fn update_paywall_config(
    &self,
    update: PaywallConfigUpdate,
  ) -> Result<PaywallConfig> {
    update.validate()?;

    let config = PaywallConfig {
      free_article_limit: update.free_article_limit,
      reset_period_days:  update.reset_period_days,
      updated_at:         Utc::now(),
    };
    let at_str = encode_dt(config.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO paywall_config
             (id, free_article_limit, reset_period_days, updated_at)
           VALUES (1, ?1, ?2, ?3)
           ON CONFLICT (id) DO UPDATE SET
             free_article_limit = excluded.free_article_limit,
             reset_period_days  = excluded.reset_period_days,
             updated_at         = excluded.updated_at",
          rusqlite::params![
            update.free_article_limit,
            update.reset_period_days,
            at_str
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(config)
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn find_subscription(&self, user_id: String) -> Result<Option<Subscription>> {
    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(SELECT_SUBSCRIPTION, rusqlite::params![user_id], read_subscription)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubscription::into_subscription).transpose()
  }

  async fn upsert_subscription(&self, input: NewSubscription) -> Result<Subscription> {
    let subscription = Subscription {
      user_id:              input.user_id,
      status:               input.status,
      current_period_start: input.current_period_start,
      current_period_end:   input.current_period_end,
      updated_at:           Utc::now(),
    };

    let user_id   = subscription.user_id.clone();
    let status    = encode_status(subscription.status);
    let start_str = subscription.current_period_start.map(encode_dt);
    let end_str   = subscription.current_period_end.map(encode_dt);
    let at_str    = encode_dt(subscription.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subscriptions
             (user_id, status, current_period_start, current_period_end, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (user_id) DO UPDATE SET
             status               = excluded.status,
             current_period_start = excluded.current_period_start,
             current_period_end   = excluded.current_period_end,
             updated_at           = excluded.updated_at",
          rusqlite::params![user_id, status, start_str, end_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(subscription)
  }

  // ── View log ──────────────────────────────────────────────────────────────

  async fn count_views(&self, identity: Identity, since: DateTime<Utc>) -> Result<u64> {
    let since_str = encode_dt(since);

    let count: i64 = self
      .conn
      .call(move |conn| {
        let (sql, key) = match identity {
          Identity::User { user_id } => (
            "SELECT COUNT(*) FROM page_views WHERE user_id = ?1 AND viewed_at >= ?2",
            user_id,
          ),
          Identity::Anonymous { session_id } => (
            "SELECT COUNT(*) FROM page_views WHERE session_id = ?1 AND viewed_at >= ?2",
            session_id,
          ),
        };
        Ok(conn.query_row(sql, rusqlite::params![key, since_str], |r| r.get(0))?)
      })
      .await?;

    Ok(u64::try_from(count).unwrap_or_default())
  }

  async fn record_view(&self, input: NewPageView) -> Result<PageView> {
    let view = PageView {
      view_id:   Uuid::new_v4(),
      identity:  input.identity,
      article:   input.article,
      meta:      input.meta,
      viewed_at: input.viewed_at,
    };

    let view_id_str   = encode_uuid(view.view_id);
    let user_id       = view.identity.user_id().map(str::to_owned);
    let session_id    = view.identity.session_id().map(str::to_owned);
    let article_id    = view.article.article_id.clone();
    let article_title = view.article.article_title.clone();
    let article_url   = view.article.article_url.clone();
    let ip_address    = view.meta.ip_address.clone();
    let user_agent    = view.meta.user_agent.clone();
    let viewed_at_str = encode_dt(view.viewed_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO page_views (
             view_id, user_id, session_id, article_id, article_title,
             article_url, ip_address, user_agent, viewed_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            view_id_str,
            user_id,
            session_id,
            article_id,
            article_title,
            article_url,
            ip_address,
            user_agent,
            viewed_at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(view)
  }

  async fn list_views(&self, query: &ViewQuery) -> Result<Vec<PageView>> {
    let user_id    = query
      .identity
      .as_ref()
      .and_then(Identity::user_id)
      .map(str::to_owned);
    let session_id = query
      .identity
      .as_ref()
      .and_then(Identity::session_id)
      .map(str::to_owned);
    let article_id = query.article_id.clone();
    let since_str  = query.since.map(encode_dt);
    let until_str  = query.until.map(encode_dt);
    let limit_val  = i64::try_from(query.page_size()).unwrap_or(i64::MAX);
    let offset_val = i64::try_from(query.offset.unwrap_or(0)).unwrap_or(i64::MAX);

    let raws: Vec<RawPageView> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {}
           FROM page_views
           WHERE (?1 IS NULL OR user_id    = ?1)
             AND (?2 IS NULL OR session_id = ?2)
             AND (?3 IS NULL OR article_id = ?3)
             AND (?4 IS NULL OR viewed_at >= ?4)
             AND (?5 IS NULL OR viewed_at <  ?5)
           ORDER BY viewed_at DESC, rowid DESC
           LIMIT ?6 OFFSET ?7",
          RawPageView::COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              user_id,
              session_id,
              article_id,
              since_str,
              until_str,
              limit_val,
              offset_val,
            ],
            RawPageView::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPageView::into_view).collect()
  }
}
