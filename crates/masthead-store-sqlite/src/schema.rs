//! SQL schema for the Masthead SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Single row, enforced by the CHECK on id.
CREATE TABLE IF NOT EXISTS paywall_config (
    id                 INTEGER PRIMARY KEY CHECK (id = 1),
    free_article_limit INTEGER NOT NULL CHECK (free_article_limit >= 0),
    reset_period_days  INTEGER NOT NULL CHECK (reset_period_days >= 1),
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
    user_id              TEXT PRIMARY KEY,
    status               TEXT NOT NULL,  -- 'ACTIVE' | 'INACTIVE' | 'PAST_DUE' | 'CANCELED' | 'TRIALING'
    current_period_start TEXT,
    current_period_end   TEXT,
    updated_at           TEXT NOT NULL
);

-- Views are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS page_views (
    view_id       TEXT PRIMARY KEY,
    user_id       TEXT,
    session_id    TEXT,
    article_id    TEXT NOT NULL,
    article_title TEXT NOT NULL,
    article_url   TEXT NOT NULL,
    ip_address    TEXT,
    user_agent    TEXT,
    viewed_at     TEXT NOT NULL,   -- fixed-width RFC 3339 UTC; compared as text
    CHECK ((user_id IS NULL) != (session_id IS NULL))
);

CREATE INDEX IF NOT EXISTS page_views_user_idx    ON page_views(user_id, viewed_at);
CREATE INDEX IF NOT EXISTS page_views_session_idx ON page_views(session_id, viewed_at);
CREATE INDEX IF NOT EXISTS page_views_viewed_idx  ON page_views(viewed_at);

PRAGMA user_version = 1;
";
