//! RSS/Atom feed processing.

use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use tracing::debug;

use super::cancel::FetchContext;
use super::cap;
use super::dedup::DedupGate;
use super::error::FetchError;
use super::http::{FetchResponse, HttpFetcher};
use super::normalizer::{self, strip_html};
use super::outcome::FetchReport;
use crate::item::ItemStore;
use crate::source::{CacheValidators, Source};

/// Fetches a feed and turns its new entries into items.
pub struct FeedProcessor<'a> {
    http: &'a HttpFetcher,
    items: &'a dyn ItemStore,
}

impl<'a> FeedProcessor<'a> {
    pub fn new(http: &'a HttpFetcher, items: &'a dyn ItemStore) -> Self {
        Self { http, items }
    }

    /// Fetch `source` with its cache validators and collect new items.
    ///
    /// Nothing is written to storage.
    pub async fn process(
        &self,
        ctx: &FetchContext,
        source: &Source,
        now: DateTime<Utc>,
    ) -> Result<FetchReport, FetchError> {
        let response = self.http.get(ctx, &source.url, Some(&source.cache)).await?;
        let (bytes, cache) = match response {
            FetchResponse::NotModified => {
                debug!("Feed {} not modified", source.url);
                return Ok(FetchReport::not_modified());
            }
            FetchResponse::Body {
                bytes,
                last_modified,
                etag,
                ..
            } => (
                bytes,
                CacheValidators {
                    last_modified,
                    etag,
                },
            ),
        };

        let feed = feed_rs::parser::parse(bytes.as_slice())
            .map_err(|e| FetchError::Parse(format!("failed to parse feed: {e}")))?;
        let publisher = feed
            .title
            .as_ref()
            .map(|t| strip_html(&t.content))
            .filter(|t| !t.is_empty());

        let mut report = FetchReport {
            cache: Some(cache),
            ..FetchReport::default()
        };
        report.stats.pages = 1;

        let total = feed.entries.len();
        let linked: Vec<Entry> = feed
            .entries
            .into_iter()
            .filter(|e| normalizer::entry_url(e).is_some())
            .collect();
        if linked.len() < total {
            debug!(
                "Skipping {} entries without a link in {}",
                total - linked.len(),
                source.url
            );
        }
        report.stats.discovered = linked.len();

        let limit = cap::limit(source.last_fetched_at, now);
        let candidates = cap::most_recent(linked, limit, normalizer::entry_date);
        report.stats.capped = report.stats.discovered - candidates.len();

        let mut gate = DedupGate::new(self.items);
        for entry in &candidates {
            ctx.check()?;
            let Some(item) = normalizer::from_feed_entry(entry, source, publisher.as_deref(), now)
            else {
                continue;
            };
            if !gate.admit(&item.url).await? {
                report.stats.duplicates += 1;
                continue;
            }
            report.items.push(item);
        }

        Ok(report)
    }
}
