//! Website scraping in direct and list discovery modes.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, warn};
use url::Url;

use super::cancel::FetchContext;
use super::cap;
use super::dedup::DedupGate;
use super::error::{FetchError, ValidationError};
use super::extractor::{self, Article};
use super::http::HttpFetcher;
use super::normalizer;
use super::outcome::FetchReport;
use crate::item::{Item, ItemStore};
use crate::source::{DiscoveryMode, ScraperConfig, Source};

/// Maximum title length accepted for a scraped article.
pub const MAX_TITLE_LENGTH: usize = 500;

/// Articles dated before this year are rejected.
pub const MIN_ARTICLE_YEAR: i32 = 1990;

/// Scrapes a website source.
pub struct ScraperProcessor<'a> {
    http: &'a HttpFetcher,
    items: &'a dyn ItemStore,
}

impl<'a> ScraperProcessor<'a> {
    pub fn new(http: &'a HttpFetcher, items: &'a dyn ItemStore) -> Self {
        Self { http, items }
    }

    /// Scrape `source` according to its discovery mode.
    ///
    /// Nothing is written to storage.
    pub async fn process(
        &self,
        ctx: &FetchContext,
        source: &Source,
        config: &ScraperConfig,
        now: DateTime<Utc>,
    ) -> Result<FetchReport, FetchError> {
        let source_url =
            Url::parse(&source.url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        match config.discovery_mode {
            DiscoveryMode::Direct => self.direct(ctx, source, &source_url, config, now).await,
            DiscoveryMode::List => self.list(ctx, source, &source_url, config, now).await,
        }
    }

    /// The source URL is the article.
    async fn direct(
        &self,
        ctx: &FetchContext,
        source: &Source,
        source_url: &Url,
        config: &ScraperConfig,
        now: DateTime<Utc>,
    ) -> Result<FetchReport, FetchError> {
        let mut report = FetchReport::default();
        report.stats.pages = 1;
        report.stats.discovered = 1;

        let page = self.http.get_page(ctx, &source.url).await?;
        let article = extractor::extract_article(&page.html, config)?;

        let Some(item) = accept(&article, &source.url, source, source_url, now) else {
            report.stats.rejected += 1;
            return Ok(report);
        };

        let mut gate = DedupGate::new(self.items);
        if gate.admit(&item.url).await? {
            report.items.push(item);
        } else {
            report.stats.duplicates += 1;
        }
        Ok(report)
    }

    /// The source URL is an index page, optionally paginated.
    async fn list(
        &self,
        ctx: &FetchContext,
        source: &Source,
        source_url: &Url,
        config: &ScraperConfig,
        now: DateTime<Utc>,
    ) -> Result<FetchReport, FetchError> {
        let mut report = FetchReport::default();
        let limit = cap::limit(source.last_fetched_at, now);
        let max_pages = config.max_pages();

        let mut gate = DedupGate::new(self.items);
        let mut visited: HashSet<Url> = HashSet::new();
        let mut candidates: HashSet<Url> = HashSet::new();
        let mut processed = 0usize;
        let mut page_url = source_url.clone();

        for page_number in 1..=max_pages {
            visited.insert(page_url.clone());
            let page = match self.http.get_page(ctx, page_url.as_str()).await {
                Ok(page) => page,
                // The index itself failing fails the source.
                Err(e) if page_number == 1 => return Err(e),
                Err(e) => {
                    ctx.check()?;
                    warn!("Stopping pagination of {} at {}: {}", source.url, page_url, e);
                    break;
                }
            };
            report.stats.pages += 1;

            let links = extractor::article_links(&page.html, &page.url, config)?;
            let next = extractor::next_page_link(&page.html, &page.url, config)?;
            debug!("{} article links on {}", links.len(), page.url);

            for link in links {
                if !candidates.insert(link.clone()) {
                    continue;
                }
                report.stats.discovered += 1;
                if limit.is_some_and(|limit| processed >= limit) {
                    report.stats.capped += 1;
                    continue;
                }
                processed += 1;

                if !gate.admit(link.as_str()).await? {
                    report.stats.duplicates += 1;
                    continue;
                }

                match self.article(ctx, source, source_url, config, &link, now).await {
                    Ok(Some(item)) => report.items.push(item),
                    Ok(None) => report.stats.rejected += 1,
                    Err(e) => {
                        // Deadline or shutdown ends the whole fetch.
                        ctx.check()?;
                        warn!("Failed to fetch article {}: {}", link, e);
                        report.stats.article_failures += 1;
                    }
                }
            }

            if limit.is_some_and(|limit| processed >= limit) {
                debug!("Volume cap reached for {}", source.url);
                break;
            }
            match next {
                Some(next) if !visited.contains(&next) => page_url = next,
                Some(next) => {
                    debug!("Next page {} already visited", next);
                    break;
                }
                None => break,
            }
        }

        Ok(report)
    }

    async fn article(
        &self,
        ctx: &FetchContext,
        source: &Source,
        source_url: &Url,
        config: &ScraperConfig,
        link: &Url,
        now: DateTime<Utc>,
    ) -> Result<Option<Item>, FetchError> {
        let page = self.http.get_page(ctx, link.as_str()).await?;
        let article = extractor::extract_article(&page.html, config)?;
        Ok(accept(&article, link.as_str(), source, source_url, now))
    }
}

/// Validate and normalize an article, logging rejections.
fn accept(
    article: &Article,
    url: &str,
    source: &Source,
    source_url: &Url,
    now: DateTime<Utc>,
) -> Option<Item> {
    if let Err(e) = validate_article(article, url, source_url, now) {
        warn!("Rejected article {} from {}: {}", url, source.url, e);
        return None;
    }
    if article.content.trim().is_empty() {
        warn!("Article {} has no content", url);
    }
    Some(normalizer::from_article(article, url, source, now))
}

/// Check a scraped article before admission.
///
/// Hosts compare literally as `scheme://host[:port]`, so an `http` article
/// on an `https` source is rejected.
pub fn validate_article(
    article: &Article,
    url: &str,
    source_url: &Url,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    let title = article.title.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let length = title.chars().count();
    if length > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong(length));
    }

    let parsed = Url::parse(url).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::UnsupportedScheme(parsed.scheme().to_string()));
    }

    let expected = host_key(source_url);
    let found = host_key(&parsed);
    if expected != found {
        return Err(ValidationError::HostMismatch { expected, found });
    }

    if let Some(date) = article.date {
        if date.year() < MIN_ARTICLE_YEAR {
            return Err(ValidationError::DateTooOld(date));
        }
        if date > now {
            return Err(ValidationError::DateInFuture(date));
        }
    }

    Ok(())
}

fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    }
}
