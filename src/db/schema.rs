//! Database schema and migrations for newsdesk.
//!
//! Migrations are applied in order when the database is opened; the
//! schema_version table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Sources table
    r#"
CREATE TABLE sources (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    source_type             TEXT NOT NULL,          -- 'rss', 'atom', 'website'
    url                     TEXT NOT NULL,
    name                    TEXT NOT NULL,
    enabled_at              TEXT,                   -- NULL = disabled
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL,
    polling_interval_secs   INTEGER,                -- NULL = system default
    last_fetched_at         TEXT,                   -- NULL = never fetched
    last_modified           TEXT,
    etag                    TEXT,
    fetch_error_count       INTEGER NOT NULL DEFAULT 0,
    last_error              TEXT,
    scraper_config          TEXT,                   -- JSON, websites only
    CHECK ((source_type = 'website') = (scraper_config IS NOT NULL))
);

CREATE INDEX idx_sources_enabled_at ON sources(enabled_at);
"#,
];
