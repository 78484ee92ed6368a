//! Per-fetch results handed from processors to the orchestrator.

use super::error::FetchError;
use crate::item::Item;
use crate::source::CacheValidators;

/// Result of one fetch attempt, as seen by health tracking and logging.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The fetch succeeded and `new_items` items were admitted.
    Success { new_items: usize },
    /// The server answered 304.
    NotModified,
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, FetchOutcome::Failed(_))
    }

    /// Items admitted by this fetch.
    pub fn new_items(&self) -> usize {
        match self {
            FetchOutcome::Success { new_items } => *new_items,
            _ => 0,
        }
    }
}

/// Counters describing what a processor did with its candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Candidates found in the document(s) before the cap.
    pub discovered: usize,
    /// Candidates dropped because the volume cap was active.
    pub capped: usize,
    /// Candidates already stored or repeated within this fetch.
    pub duplicates: usize,
    /// Scraped candidates rejected by validation.
    pub rejected: usize,
    /// List-mode article pages that could not be fetched.
    pub article_failures: usize,
    /// Index or feed pages fetched.
    pub pages: usize,
}

/// What a processor produced. Nothing in it has been persisted yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    /// New items in admission order.
    pub items: Vec<Item>,
    /// Validators to remember for the next conditional request.
    pub cache: Option<CacheValidators>,
    pub not_modified: bool,
    pub stats: FetchStats,
}

impl FetchReport {
    pub fn not_modified() -> Self {
        Self {
            not_modified: true,
            ..Self::default()
        }
    }
}
