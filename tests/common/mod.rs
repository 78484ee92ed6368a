//! Test helpers for integration tests.
//!
//! Provides a local fixture web server, a temporary source database and
//! item store, and builders for feed and HTML documents.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use newsdesk::config::DiscoveryConfig;
use newsdesk::source::{FeedFormat, ScraperConfig};
use newsdesk::{
    Database, Engine, FileItemStore, Item, ItemStore, NewSource, Source, SourceRepository,
};

/// Default timeout for waiting on the engine.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub type Entry = (String, String, Option<DateTime<Utc>>);

/// Serve `router` on an ephemeral loopback port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fixture server");
    let addr = listener.local_addr().expect("Fixture server has no address");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Fixture server failed");
    });
    format!("http://{addr}")
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

/// Discovery configuration for tests: loopback allowed, short timers.
pub fn test_config() -> DiscoveryConfig {
    DiscoveryConfig {
        tick_interval_secs: 1,
        fetch_timeout_secs: 10,
        request_timeout_secs: 5,
        shutdown_grace_secs: 2,
        allow_private_hosts: true,
        ..DiscoveryConfig::default()
    }
}

/// A source database and item store in a temporary directory.
pub struct TestEnv {
    pub dir: TempDir,
    pub db: Database,
    pub sources: Arc<SourceRepository>,
    pub items: Arc<FileItemStore>,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db = Database::open(dir.path().join("newsdesk.db"))
            .await
            .expect("Failed to open database");
        let sources = Arc::new(SourceRepository::new(db.pool()));
        let items = Arc::new(
            FileItemStore::open(dir.path().join("items"))
                .await
                .expect("Failed to open item store"),
        );
        Self {
            dir,
            db,
            sources,
            items,
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine_with(test_config())
    }

    pub fn engine_with(&self, config: DiscoveryConfig) -> Engine {
        Engine::new(config, self.sources.clone(), self.items.clone())
            .expect("Failed to create engine")
    }

    pub async fn add_feed(&self, url: &str) -> Source {
        self.sources
            .create(&NewSource::feed(FeedFormat::Rss, url, "Test Feed"))
            .await
            .expect("Failed to create feed source")
    }

    pub async fn add_website(&self, url: &str, config: ScraperConfig) -> Source {
        self.sources
            .create(&NewSource::website(url, "Test Site", config))
            .await
            .expect("Failed to create website source")
    }

    /// Re-read a source from the database.
    pub async fn source(&self, source: &Source) -> Source {
        self.sources
            .get_by_id(source.id)
            .await
            .expect("Failed to read source")
            .expect("Source disappeared")
    }

    /// Stored items, newest `updated_at` first.
    pub async fn items(&self) -> Vec<Item> {
        let mut items = self.items.list().await.expect("Failed to list items");
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        items
    }
}

/// Publication date `n` hours after a fixed epoch; larger is newer.
pub fn hour(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(n)
}

pub fn entry(title: &str, link: &str, date: Option<DateTime<Utc>>) -> Entry {
    (title.to_string(), link.to_string(), date)
}

/// `n` dated entries linking to `{base}/{i}`; entry `n - 1` is newest.
pub fn numbered_entries(base: &str, n: i64) -> Vec<Entry> {
    (0..n)
        .map(|i| entry(&format!("Entry {i}"), &format!("{base}/{i}"), Some(hour(i))))
        .collect()
}

/// RSS 2.0 document with one item per entry.
pub fn rss(entries: &[Entry]) -> String {
    let items: String = entries
        .iter()
        .map(|(title, link, date)| {
            let date = date
                .map(|d| format!("<pubDate>{}</pubDate>", d.to_rfc2822()))
                .unwrap_or_default();
            format!(
                "<item><title>{title}</title><link>{link}</link>\
                 <description>&lt;p&gt;About {title}&lt;/p&gt;</description>{date}</item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Fixture News</title><link>http://example.com/</link><description>fixture</description>{items}</channel></rss>"#
    )
}

/// Index page with `a.story` links and an optional `a.next` link.
pub fn index_page(links: &[String], next: Option<&str>) -> String {
    let links: String = links
        .iter()
        .map(|href| format!(r#"<li><a class="story" href="{href}">story</a></li>"#))
        .collect();
    let next = next
        .map(|href| format!(r#"<a class="next" href="{href}">Older</a>"#))
        .unwrap_or_default();
    format!("<html><body><ul>{links}</ul>{next}</body></html>")
}

/// Article page with an `h1` title, `div.body` content and a byline.
pub fn article_page(title: &str, body: &str, author: &str) -> String {
    format!(
        r#"<html><head><title>{title} | Site</title><meta property="og:site_name" content="Fixture Site"></head><body><h1>{title}</h1><span class="byline">{author}</span><div class="body"><p>{body}</p></div></body></html>"#
    )
}

/// Scraper configuration matching [`index_page`] and [`article_page`].
pub fn list_config() -> ScraperConfig {
    ScraperConfig::list("a.story")
        .with_title_selector("h1")
        .with_content_selector("div.body")
        .with_author_selector("span.byline")
}
