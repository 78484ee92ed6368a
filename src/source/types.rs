//! Source types for newsdesk.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{NewsdeskError, Result};

/// Source identifier assigned by the source store.
pub type SourceId = i64;

/// Lower bound for the effective polling interval (5 minutes).
pub const MIN_POLLING_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound for the effective polling interval (24 hours).
pub const MAX_POLLING_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default number of index pages visited by a list-mode scrape.
pub const DEFAULT_MAX_PAGES: u32 = 1;

/// Stored source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Rss,
    Atom,
    Website,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Rss => "rss",
            SourceType::Atom => "atom",
            SourceType::Website => "website",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = NewsdeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rss" => Ok(SourceType::Rss),
            "atom" => Ok(SourceType::Atom),
            "website" => Ok(SourceType::Website),
            other => Err(NewsdeskError::Validation(format!(
                "unknown source type: {other}"
            ))),
        }
    }
}

/// Syndication format of a feed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
}

/// How a website source discovers articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// The source URL is the article.
    #[default]
    Direct,
    /// The source URL is an index page linking to articles.
    List,
}

/// Selector configuration for website sources.
///
/// Persisted as JSON in the source store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default)]
    pub discovery_mode: DiscoveryMode,
    /// List mode: selects the article links on an index page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_selector: Option<String>,
    /// List mode: selects the "next page" link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination_selector: Option<String>,
    /// List mode: maximum index pages per fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_selector: Option<String>,
    /// chrono format string for the extracted date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
}

impl ScraperConfig {
    /// Direct-mode configuration with a title selector.
    pub fn direct(title_selector: impl Into<String>) -> Self {
        Self {
            title_selector: Some(title_selector.into()),
            ..Self::default()
        }
    }

    /// List-mode configuration with the article link selector.
    pub fn list(article_selector: impl Into<String>) -> Self {
        Self {
            discovery_mode: DiscoveryMode::List,
            article_selector: Some(article_selector.into()),
            ..Self::default()
        }
    }

    pub fn with_pagination(mut self, selector: impl Into<String>, max_pages: u32) -> Self {
        self.pagination_selector = Some(selector.into());
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_title_selector(mut self, selector: impl Into<String>) -> Self {
        self.title_selector = Some(selector.into());
        self
    }

    pub fn with_content_selector(mut self, selector: impl Into<String>) -> Self {
        self.content_selector = Some(selector.into());
        self
    }

    pub fn with_author_selector(mut self, selector: impl Into<String>) -> Self {
        self.author_selector = Some(selector.into());
        self
    }

    pub fn with_date(mut self, selector: impl Into<String>, format: Option<&str>) -> Self {
        self.date_selector = Some(selector.into());
        self.date_format = format.map(str::to_string);
        self
    }

    /// Effective page limit for list mode (at least one page).
    pub fn max_pages(&self) -> u32 {
        self.max_pages.unwrap_or(DEFAULT_MAX_PAGES).max(1)
    }

    /// Check that the configuration is usable for its discovery mode.
    pub fn validate(&self) -> Result<()> {
        if self.discovery_mode == DiscoveryMode::List
            && self
                .article_selector
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(NewsdeskError::Validation(
                "list mode requires an article selector".to_string(),
            ));
        }
        let selectors = [
            &self.article_selector,
            &self.pagination_selector,
            &self.title_selector,
            &self.content_selector,
            &self.author_selector,
            &self.date_selector,
        ];
        for selector in selectors.into_iter().flatten() {
            scraper::Selector::parse(selector).map_err(|e| {
                NewsdeskError::Validation(format!("invalid selector {selector:?}: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Per-type source configuration.
///
/// `Website` is the only kind that carries a scraper configuration, so a
/// feed with selectors or a website without them cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Feed(FeedFormat),
    Website(ScraperConfig),
}

impl SourceKind {
    pub fn source_type(&self) -> SourceType {
        match self {
            SourceKind::Feed(FeedFormat::Rss) => SourceType::Rss,
            SourceKind::Feed(FeedFormat::Atom) => SourceType::Atom,
            SourceKind::Website(_) => SourceType::Website,
        }
    }

    /// Rebuild the kind from its stored columns.
    pub fn from_parts(source_type: SourceType, scraper_config: Option<ScraperConfig>) -> Result<Self> {
        match (source_type, scraper_config) {
            (SourceType::Rss, None) => Ok(SourceKind::Feed(FeedFormat::Rss)),
            (SourceType::Atom, None) => Ok(SourceKind::Feed(FeedFormat::Atom)),
            (SourceType::Website, Some(config)) => Ok(SourceKind::Website(config)),
            (SourceType::Website, None) => Err(NewsdeskError::Validation(
                "website source without scraper configuration".to_string(),
            )),
            (other, Some(_)) => Err(NewsdeskError::Validation(format!(
                "{other} source must not carry a scraper configuration"
            ))),
        }
    }
}

/// HTTP cache validators remembered between feed fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheValidators {
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// A configured origin polled by the discovery engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: SourceId,
    pub kind: SourceKind,
    pub url: String,
    pub name: String,
    /// When the source was enabled; `None` means disabled.
    pub enabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Source-specific polling interval; `None` uses the system default.
    pub polling_interval: Option<Duration>,
    /// `None` means never fetched.
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub cache: CacheValidators,
    pub fetch_error_count: u32,
    pub last_error: Option<String>,
}

impl Source {
    pub fn source_type(&self) -> SourceType {
        self.kind.source_type()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled_at.is_some()
    }

    pub fn scraper_config(&self) -> Option<&ScraperConfig> {
        match &self.kind {
            SourceKind::Website(config) => Some(config),
            SourceKind::Feed(_) => None,
        }
    }

    /// Polling interval in effect, bounded to [5 min, 24 h].
    pub fn effective_polling_interval(&self, default: Duration) -> Duration {
        self.polling_interval
            .unwrap_or(default)
            .clamp(MIN_POLLING_INTERVAL, MAX_POLLING_INTERVAL)
    }
}

/// Partial update of the engine-owned source fields.
///
/// Name, URL, polling interval and scraper configuration are not
/// representable here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceUpdate {
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_modified: Option<Option<String>>,
    pub etag: Option<Option<String>>,
    pub fetch_error_count: Option<u32>,
    pub last_error: Option<Option<String>>,
    pub enabled_at: Option<Option<DateTime<Utc>>>,
}

impl SourceUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_fetched_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_fetched_at = Some(at);
        self
    }

    pub fn with_cache(mut self, cache: CacheValidators) -> Self {
        self.last_modified = Some(cache.last_modified);
        self.etag = Some(cache.etag);
        self
    }

    pub fn with_error_count(mut self, count: u32) -> Self {
        self.fetch_error_count = Some(count);
        self
    }

    pub fn with_last_error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }

    pub fn with_enabled_at(mut self, enabled_at: Option<DateTime<Utc>>) -> Self {
        self.enabled_at = Some(enabled_at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.last_fetched_at.is_none()
            && self.last_modified.is_none()
            && self.etag.is_none()
            && self.fetch_error_count.is_none()
            && self.last_error.is_none()
            && self.enabled_at.is_none()
    }

    /// Apply the update to an in-memory copy of the source.
    pub fn apply_to(&self, source: &mut Source) {
        if let Some(at) = self.last_fetched_at {
            source.last_fetched_at = Some(at);
        }
        if let Some(ref last_modified) = self.last_modified {
            source.cache.last_modified = last_modified.clone();
        }
        if let Some(ref etag) = self.etag {
            source.cache.etag = etag.clone();
        }
        if let Some(count) = self.fetch_error_count {
            source.fetch_error_count = count;
        }
        if let Some(ref error) = self.last_error {
            source.last_error = error.clone();
        }
        if let Some(enabled_at) = self.enabled_at {
            source.enabled_at = enabled_at;
        }
    }
}

/// New source for administrative creation.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub kind: SourceKind,
    pub url: String,
    pub name: String,
    pub polling_interval: Option<Duration>,
    pub enabled: bool,
}

impl NewSource {
    /// Create an enabled feed source.
    pub fn feed(format: FeedFormat, url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Feed(format),
            url: url.into(),
            name: name.into(),
            polling_interval: None,
            enabled: true,
        }
    }

    /// Create an enabled website source.
    pub fn website(url: impl Into<String>, name: impl Into<String>, config: ScraperConfig) -> Self {
        Self {
            kind: SourceKind::Website(config),
            url: url.into(),
            name: name.into(),
            polling_interval: None,
            enabled: true,
        }
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(NewsdeskError::Validation("source name is empty".to_string()));
        }
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| NewsdeskError::Validation(format!("invalid source URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NewsdeskError::Validation(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }
        if let SourceKind::Website(config) = &self.kind {
            config.validate()?;
        }
        Ok(())
    }
}
