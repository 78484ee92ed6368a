//! Conversion of feed entries and scraped articles into items.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Person};
use scraper::{Html, Node};
use uuid::Uuid;

use super::extractor::Article;
use crate::item::{Item, ELLIPSIS, MAX_SUMMARY_LENGTH, UNTITLED};
use crate::source::Source;

/// Build an item from a feed entry.
///
/// Returns `None` for entries without a link, since an item is identified
/// downstream by its URL.
pub fn from_feed_entry(
    entry: &Entry,
    source: &Source,
    publisher: Option<&str>,
    now: DateTime<Utc>,
) -> Option<Item> {
    let url = entry_url(entry)?;

    let title = entry
        .title
        .as_ref()
        .map(|t| strip_html(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let summary = entry
        .summary
        .as_ref()
        .map(|s| s.content.as_str())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.as_deref()))
        .map(summarize)
        .unwrap_or_default();

    let names: Vec<String> = entry.authors.iter().filter_map(person_name).collect();
    let authors = merge_authors(names.iter().map(String::as_str));

    Some(Item {
        id: Uuid::new_v4(),
        source_id: Some(source.id),
        title,
        summary,
        url,
        publisher: publisher
            .map(str::to_string)
            .or_else(|| Some(source.name.clone())),
        authors,
        updated_at: entry_date(entry).unwrap_or(now),
        discovered_at: now,
        pinned_at: None,
    })
}

/// Build an item from an extracted article page.
pub fn from_article(article: &Article, url: &str, source: &Source, now: DateTime<Utc>) -> Item {
    let title = article
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();

    Item {
        id: Uuid::new_v4(),
        source_id: Some(source.id),
        title,
        summary: summarize(&article.content),
        url: url.to_string(),
        publisher: article
            .site_name
            .clone()
            .or_else(|| Some(source.name.clone())),
        authors: merge_authors(article.authors.iter().map(String::as_str)),
        updated_at: article.date.unwrap_or(now),
        discovered_at: now,
        pinned_at: None,
    }
}

/// The entry's link, if it has one.
pub fn entry_url(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .map(|l| l.href.trim())
        .find(|href| !href.is_empty())
        .map(str::to_string)
}

/// Display name of a feed author.
///
/// feed-rs reports an RSS `<author>` as a person named `author` whose email
/// holds the element text, usually `address (Name)`.
fn person_name(person: &Person) -> Option<String> {
    let name = person.name.trim();
    if !name.is_empty() && name != RSS_AUTHOR_PLACEHOLDER {
        return Some(name.to_string());
    }

    let raw = person.email.as_deref().map(str::trim).unwrap_or_default();
    let display = match (raw.find('('), raw.rfind(')')) {
        (Some(open), Some(close)) if open < close => raw[open + 1..close].trim(),
        _ => raw,
    };
    (!display.is_empty()).then(|| display.to_string())
}

const RSS_AUTHOR_PLACEHOLDER: &str = "author";

/// Most-current date of a feed entry: updated, else published.
pub fn entry_date(entry: &Entry) -> Option<DateTime<Utc>> {
    entry.updated.or(entry.published)
}

/// Plain-text summary, cut to the summary limit with an ellipsis.
pub fn summarize(text: &str) -> String {
    truncate(&strip_html(text), MAX_SUMMARY_LENGTH)
}

/// Truncate to `max` characters, appending an ellipsis if anything was cut.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

/// Reduce HTML to whitespace-collapsed plain text.
///
/// Entities are decoded by the HTML parser. Script and style contents are
/// dropped.
pub fn strip_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());

    for node in fragment.root_element().descendants() {
        let Node::Text(chunk) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element())
            .is_some_and(|e| matches!(e.name(), "script" | "style"));
        if !hidden {
            text.push_str(chunk);
            text.push(' ');
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a single author field into names.
///
/// `", "` takes precedence over `" and "`; without either the whole string
/// is one name.
pub fn split_authors(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let parts: Vec<&str> = if raw.contains(", ") {
        raw.split(", ").collect()
    } else if raw.contains(" and ") {
        raw.split(" and ").collect()
    } else {
        vec![raw]
    };

    parts
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Merge author signals into one list, dropping exact duplicates and
/// keeping first-seen order.
pub fn merge_authors<'a>(signals: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut authors = Vec::new();
    for name in signals.into_iter().flat_map(split_authors) {
        if seen.insert(name.clone()) {
            authors.push(name);
        }
    }
    authors
}
