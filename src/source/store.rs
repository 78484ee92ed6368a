//! Source store interface consumed by the discovery engine.

use async_trait::async_trait;

use super::types::{Source, SourceId, SourceUpdate};
use crate::Result;

/// Persistent source configuration and metadata, keyed by source ID.
///
/// The engine reads sources through this trait and writes back only the
/// fields carried by [`SourceUpdate`].
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// List every enabled source.
    async fn list_enabled(&self) -> Result<Vec<Source>>;

    /// Get one source; `NotFound` if it was deleted.
    async fn get(&self, id: SourceId) -> Result<Source>;

    /// Apply a partial update of the engine-owned fields.
    async fn update(&self, id: SourceId, update: &SourceUpdate) -> Result<()>;
}
