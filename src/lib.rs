//! newsdesk - news aggregation engine
//!
//! Polls RSS/Atom feeds and scraped websites on a schedule and admits what
//! they publish into an append-only item store.

pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod item;
pub mod logging;
pub mod source;

pub use config::Config;
pub use db::Database;
pub use discovery::{Engine, EngineHandle, FetchError, FetchOutcome, SourceRun};
pub use error::{NewsdeskError, Result};
pub use item::{FileItemStore, Item, ItemStore};
pub use source::{NewSource, Source, SourceRepository, SourceStore};
