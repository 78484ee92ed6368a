//! Article extraction from HTML using CSS selectors.
//!
//! Everything here is synchronous: parsed documents never live across an
//! await point.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::error::FetchError;
use crate::source::ScraperConfig;

/// Fields extracted from one article page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Article {
    pub title: Option<String>,
    /// Plain text of the article body. May be empty.
    pub content: String,
    /// Raw author signals, not yet split or deduplicated.
    pub authors: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    pub site_name: Option<String>,
}

/// Extract an article from a page.
pub fn extract_article(html: &str, config: &ScraperConfig) -> Result<Article, FetchError> {
    let document = Html::parse_document(html);

    let title = match config.title_selector.as_deref() {
        Some(css) => first_text(&document, &selector(css)?),
        None => None,
    }
    .or_else(|| meta_content(&document, r#"meta[property="og:title"]"#))
    .or_else(|| {
        let title = Selector::parse("title").ok()?;
        first_text(&document, &title)
    });

    let content = match config.content_selector.as_deref() {
        Some(css) => {
            let sel = selector(css)?;
            let blocks: Vec<String> = document.select(&sel).filter_map(element_text).collect();
            blocks.join("\n")
        }
        None => meta_content(&document, r#"meta[name="description"]"#)
            .or_else(|| meta_content(&document, r#"meta[property="og:description"]"#))
            .unwrap_or_default(),
    };

    let mut authors = Vec::new();
    if let Some(css) = config.author_selector.as_deref() {
        authors.extend(document.select(&selector(css)?).filter_map(element_text));
    }
    authors.extend(meta_content(&document, r#"meta[name="author"]"#));

    let date = match config.date_selector.as_deref() {
        Some(css) => document
            .select(&selector(css)?)
            .next()
            .and_then(date_value)
            .and_then(|raw| parse_date(&raw, config.date_format.as_deref())),
        None => meta_content(&document, r#"meta[property="article:published_time"]"#)
            .and_then(|raw| parse_date(&raw, None)),
    };

    Ok(Article {
        title,
        content,
        authors,
        date,
        site_name: meta_content(&document, r#"meta[property="og:site_name"]"#),
    })
}

/// Article URLs on an index page, resolved against the page URL.
///
/// Order follows the document; repeated links keep their first position.
pub fn article_links(html: &str, base: &Url, config: &ScraperConfig) -> Result<Vec<Url>, FetchError> {
    let Some(css) = config.article_selector.as_deref() else {
        return Err(FetchError::Parse(
            "list mode requires an article selector".to_string(),
        ));
    };
    let sel = selector(css)?;
    let document = Html::parse_document(html);

    let mut links: Vec<Url> = Vec::new();
    for element in document.select(&sel) {
        if let Some(url) = link_target(element, base) {
            if !links.contains(&url) {
                links.push(url);
            }
        }
    }
    Ok(links)
}

/// The "next page" link of an index page, if pagination is configured.
pub fn next_page_link(
    html: &str,
    base: &Url,
    config: &ScraperConfig,
) -> Result<Option<Url>, FetchError> {
    let Some(css) = config.pagination_selector.as_deref() else {
        return Ok(None);
    };
    let sel = selector(css)?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&sel)
        .find_map(|element| link_target(element, base)))
}

/// Parse a date string with an optional explicit chrono format.
///
/// Falls back to RFC 3339, RFC 2822 and a bare `YYYY-MM-DD` date.
pub fn parse_date(raw: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(fmt) = format {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
                .map(|n| Utc.from_utc_datetime(&n))
        })
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Parse(format!("invalid selector {css:?}: {e}")))
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn first_text(document: &Html, sel: &Selector) -> Option<String> {
    document.select(sel).find_map(element_text)
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    document
        .select(&sel)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

/// `datetime` or `content` attribute first, then the element text.
fn date_value(element: ElementRef<'_>) -> Option<String> {
    element
        .value()
        .attr("datetime")
        .or_else(|| element.value().attr("content"))
        .map(str::to_string)
        .or_else(|| element_text(element))
}

/// Resolve the href of an `<a>` element, or of the first link inside it.
fn link_target(element: ElementRef<'_>, base: &Url) -> Option<Url> {
    let href = element.value().attr("href").or_else(|| {
        let anchor = Selector::parse("a[href]").ok()?;
        element
            .select(&anchor)
            .next()
            .and_then(|a| a.value().attr("href"))
    })?;

    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    base.join(href).ok()
}
