//! Configured sources: types, the store interface, and the SQLite repository.

pub mod repository;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) use types::fixtures;

pub use repository::SourceRepository;
pub use store::SourceStore;
pub use types::{
    CacheValidators, DiscoveryMode, FeedFormat, NewSource, ScraperConfig, Source, SourceId,
    SourceKind, SourceType, SourceUpdate, DEFAULT_MAX_PAGES, MAX_POLLING_INTERVAL,
    MIN_POLLING_INTERVAL,
};
