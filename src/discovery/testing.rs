//! Local HTTP fixtures for processor tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use super::http::HttpFetcher;
use crate::config::DiscoveryConfig;
use crate::item::FileItemStore;
use crate::source::{Source, SourceId, SourceStore, SourceUpdate};
use crate::{NewsdeskError, Result};

/// Serve `router` on an ephemeral loopback port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Discovery configuration that may reach the loopback fixtures.
pub fn local_config() -> DiscoveryConfig {
    DiscoveryConfig {
        allow_private_hosts: true,
        ..DiscoveryConfig::default()
    }
}

pub fn fetcher() -> HttpFetcher {
    HttpFetcher::new(&local_config()).unwrap()
}

pub async fn item_store() -> (TempDir, FileItemStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileItemStore::open(dir.path()).await.unwrap();
    (dir, store)
}

/// Request counter shared with fixture handlers.
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Publication date `n` hours after a fixed epoch; larger is newer.
pub fn hour(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(n)
}

/// RSS 2.0 document with one item per `(title, link, date)`.
pub fn rss(entries: &[(String, String, Option<DateTime<Utc>>)]) -> String {
    let items: String = entries
        .iter()
        .map(|(title, link, date)| {
            let date = date
                .map(|d| format!("<pubDate>{}</pubDate>", d.to_rfc2822()))
                .unwrap_or_default();
            format!("<item><title>{title}</title><link>{link}</link>{date}</item>")
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Fixture News</title><link>http://example.com/</link><description>fixture</description>{items}</channel></rss>"#
    )
}

/// HTML article page.
pub fn article_page(title: &str, body: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title></head><body><h1>{title}</h1><div class="body">{body}</div></body></html>"#
    )
}

/// In-memory source store.
#[derive(Default)]
pub struct MemorySources {
    sources: Mutex<HashMap<SourceId, Source>>,
}

impl MemorySources {
    pub fn with(sources: impl IntoIterator<Item = Source>) -> Self {
        Self {
            sources: Mutex::new(sources.into_iter().map(|s| (s.id, s)).collect()),
        }
    }

    pub fn snapshot(&self, id: SourceId) -> Source {
        self.sources.lock().unwrap()[&id].clone()
    }
}

#[async_trait]
impl SourceStore for MemorySources {
    async fn list_enabled(&self) -> Result<Vec<Source>> {
        let mut enabled: Vec<Source> = self
            .sources
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_enabled())
            .cloned()
            .collect();
        enabled.sort_by_key(|s| s.id);
        Ok(enabled)
    }

    async fn get(&self, id: SourceId) -> Result<Source> {
        self.sources
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| NewsdeskError::NotFound(format!("source {id}")))
    }

    async fn update(&self, id: SourceId, update: &SourceUpdate) -> Result<()> {
        let mut sources = self.sources.lock().unwrap();
        let source = sources
            .get_mut(&id)
            .ok_or_else(|| NewsdeskError::NotFound(format!("source {id}")))?;
        update.apply_to(source);
        Ok(())
    }
}
