//! SQLite source repository for newsdesk.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool};
use tracing::warn;

use super::store::SourceStore;
use super::types::{
    CacheValidators, NewSource, ScraperConfig, Source, SourceId, SourceKind, SourceType,
    SourceUpdate,
};
use crate::db::parse_datetime;
use crate::{NewsdeskError, Result};

const SOURCE_COLUMNS: &str = "id, source_type, url, name, enabled_at, created_at, updated_at, \
     polling_interval_secs, last_fetched_at, last_modified, etag, fetch_error_count, \
     last_error, scraper_config";

/// Row type for a source from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SourceRow {
    id: i64,
    source_type: String,
    url: String,
    name: String,
    enabled_at: Option<String>,
    created_at: String,
    updated_at: String,
    polling_interval_secs: Option<i64>,
    last_fetched_at: Option<String>,
    last_modified: Option<String>,
    etag: Option<String>,
    fetch_error_count: i64,
    last_error: Option<String>,
    scraper_config: Option<String>,
}

impl TryFrom<SourceRow> for Source {
    type Error = NewsdeskError;

    fn try_from(row: SourceRow) -> Result<Self> {
        let source_type: SourceType = row.source_type.parse()?;
        let scraper_config = row
            .scraper_config
            .as_deref()
            .map(serde_json::from_str::<ScraperConfig>)
            .transpose()?;

        Ok(Source {
            id: row.id,
            kind: SourceKind::from_parts(source_type, scraper_config)?,
            url: row.url,
            name: row.name,
            enabled_at: row.enabled_at.and_then(|s| parse_datetime(&s)),
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.updated_at).unwrap_or_else(Utc::now),
            polling_interval: row
                .polling_interval_secs
                .map(|secs| Duration::from_secs(secs.max(0) as u64)),
            last_fetched_at: row.last_fetched_at.and_then(|s| parse_datetime(&s)),
            cache: CacheValidators {
                last_modified: row.last_modified,
                etag: row.etag,
            },
            fetch_error_count: row.fetch_error_count.max(0) as u32,
            last_error: row.last_error,
        })
    }
}

fn rows_to_sources(rows: Vec<SourceRow>) -> Result<Vec<Source>> {
    rows.into_iter().map(Source::try_from).collect()
}

/// Repository for source operations.
///
/// Implements [`SourceStore`] for the discovery engine; the remaining
/// methods are administrative.
#[derive(Debug, Clone)]
pub struct SourceRepository {
    pool: SqlitePool,
}

impl SourceRepository {
    /// Create a new repository instance.
    pub fn new(pool: &SqlitePool) -> Self {
        Self { pool: pool.clone() }
    }

    /// Create a new source.
    pub async fn create(&self, source: &NewSource) -> Result<Source> {
        source.validate()?;

        let now = Utc::now().to_rfc3339();
        let scraper_config = match &source.kind {
            SourceKind::Website(config) => Some(serde_json::to_string(config)?),
            SourceKind::Feed(_) => None,
        };
        let enabled_at = source.enabled.then(|| now.clone());

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sources (source_type, url, name, enabled_at, created_at, updated_at,
                                 polling_interval_secs, scraper_config)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(source.kind.source_type().as_str())
        .bind(&source.url)
        .bind(&source.name)
        .bind(&enabled_at)
        .bind(&now)
        .bind(&now)
        .bind(source.polling_interval.map(|d| d.as_secs() as i64))
        .bind(&scraper_config)
        .fetch_one(&self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| NewsdeskError::NotFound(format!("source {id}")))
    }

    /// Get a source by ID.
    pub async fn get_by_id(&self, id: SourceId) -> Result<Option<Source>> {
        let query = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1");
        let row = sqlx::query_as::<_, SourceRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Source::try_from).transpose()
    }

    /// List enabled sources (ordered by registration order).
    ///
    /// Rows that cannot be decoded are logged and skipped so the remaining
    /// sources keep being polled.
    pub async fn list_enabled(&self) -> Result<Vec<Source>> {
        let query = format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE enabled_at IS NOT NULL ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, SourceRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                Source::try_from(row)
                    .map_err(|e| warn!("Skipping source {}: {}", id, e))
                    .ok()
            })
            .collect())
    }

    /// List all sources, including disabled ones.
    pub async fn list_all(&self) -> Result<Vec<Source>> {
        let query = format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY id ASC");
        let rows = sqlx::query_as::<_, SourceRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        rows_to_sources(rows)
    }

    /// Apply a partial update of the engine-owned columns.
    ///
    /// Returns false if the source does not exist.
    pub async fn update(&self, id: SourceId, update: &SourceUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE sources SET ");
        let mut separated = query.separated(", ");

        if let Some(at) = update.last_fetched_at {
            separated.push("last_fetched_at = ");
            separated.push_bind_unseparated(at.to_rfc3339());
        }
        if let Some(ref last_modified) = update.last_modified {
            separated.push("last_modified = ");
            separated.push_bind_unseparated(last_modified.clone());
        }
        if let Some(ref etag) = update.etag {
            separated.push("etag = ");
            separated.push_bind_unseparated(etag.clone());
        }
        if let Some(count) = update.fetch_error_count {
            separated.push("fetch_error_count = ");
            separated.push_bind_unseparated(i64::from(count));
        }
        if let Some(ref last_error) = update.last_error {
            separated.push("last_error = ");
            separated.push_bind_unseparated(last_error.clone());
        }
        if let Some(enabled_at) = update.enabled_at {
            separated.push("enabled_at = ");
            separated.push_bind_unseparated(enabled_at.map(|at| at.to_rfc3339()));
        }

        separated.push("updated_at = ");
        separated.push_bind_unseparated(Utc::now().to_rfc3339());

        query.push(" WHERE id = ");
        query.push_bind(id);

        let result = query.build().execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    /// Enable or disable a source.
    ///
    /// Re-enabling also resets the error state so the source starts healthy.
    pub async fn set_enabled(&self, id: SourceId, enabled: bool) -> Result<bool> {
        let update = if enabled {
            SourceUpdate::new()
                .with_enabled_at(Some(Utc::now()))
                .with_error_count(0)
                .with_last_error(None)
        } else {
            SourceUpdate::new().with_enabled_at(None)
        };
        self.update(id, &update).await
    }

    /// Delete a source. Items already ingested from it are kept.
    pub async fn delete(&self, id: SourceId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sources WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all sources.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl SourceStore for SourceRepository {
    async fn list_enabled(&self) -> Result<Vec<Source>> {
        SourceRepository::list_enabled(self).await
    }

    async fn get(&self, id: SourceId) -> Result<Source> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| NewsdeskError::NotFound(format!("source {id}")))
    }

    async fn update(&self, id: SourceId, update: &SourceUpdate) -> Result<()> {
        if SourceRepository::update(self, id, update).await? || update.is_empty() {
            Ok(())
        } else {
            Err(NewsdeskError::NotFound(format!("source {id}")))
        }
    }
}
