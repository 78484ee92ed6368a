//! URL deduplication against the item store.

use std::collections::HashSet;

use super::error::FetchError;
use crate::item::ItemStore;

/// Admission check for candidate URLs during one fetch.
///
/// URLs compare by exact string equality. A URL seen earlier in the same
/// fetch is rejected without consulting the store again.
pub struct DedupGate<'a> {
    store: &'a dyn ItemStore,
    seen: HashSet<String>,
}

impl<'a> DedupGate<'a> {
    pub fn new(store: &'a dyn ItemStore) -> Self {
        Self {
            store,
            seen: HashSet::new(),
        }
    }

    /// Whether `url` is new. Marks it as seen either way.
    pub async fn admit(&mut self, url: &str) -> Result<bool, FetchError> {
        if self.seen.contains(url) {
            return Ok(false);
        }
        let stored = self.store.exists(url).await?;
        self.seen.insert(url.to_string());
        Ok(!stored)
    }
}
