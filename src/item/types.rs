//! Item types for newsdesk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::source::SourceId;

/// Item identifier, generated at ingestion.
pub type ItemId = Uuid;

/// Maximum summary length in characters, excluding the ellipsis marker.
pub const MAX_SUMMARY_LENGTH: usize = 500;

/// Appended to summaries that were cut at [`MAX_SUMMARY_LENGTH`].
pub const ELLIPSIS: &str = "...";

/// Title used when the source provided none.
pub const UNTITLED: &str = "Untitled";

/// A normalized unit of ingested content.
///
/// `id` and `discovered_at` never change once the item is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Source that discovered the item. Kept after the source is deleted.
    pub source_id: Option<SourceId>,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub publisher: Option<String>,
    /// Author names, duplicates removed, first-seen order.
    pub authors: Vec<String>,
    /// Most-current timestamp reported by the source.
    pub updated_at: DateTime<Utc>,
    /// When the engine admitted the item.
    pub discovered_at: DateTime<Utc>,
    /// Set by readers downstream, never by the engine.
    pub pinned_at: Option<DateTime<Utc>>,
}
