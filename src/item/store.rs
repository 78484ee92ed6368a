//! Item store interface consumed by the discovery engine.

use async_trait::async_trait;

use super::types::Item;
use crate::Result;

/// Append-only item storage.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Whether an item with exactly this URL is stored.
    async fn exists(&self, url: &str) -> Result<bool>;

    /// Store a new item. Fails with `DuplicateItem` if the URL is taken.
    async fn add(&self, item: &Item) -> Result<()>;

    /// Read back every stored item.
    async fn list(&self) -> Result<Vec<Item>>;
}
