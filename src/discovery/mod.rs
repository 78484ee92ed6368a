//! Content discovery: fetching feeds and websites, turning what they
//! publish into items, and keeping source health up to date.

pub mod cancel;
pub mod cap;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod feed;
pub mod health;
pub mod http;
pub mod normalizer;
pub mod orchestrator;
pub mod outcome;
pub mod scheduler;
pub mod scraper;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::{FetchContext, Shutdown};
pub use error::{ErrorClass, FetchError, ValidationError};
pub use feed::FeedProcessor;
pub use health::{Health, HealthTracker, Transition};
pub use http::HttpFetcher;
pub use orchestrator::{Engine, EngineHandle, SourceRun};
pub use outcome::{FetchOutcome, FetchReport, FetchStats};
pub use scheduler::Scheduler;
pub use self::scraper::ScraperProcessor;
