//! Discovery engine: the control loop that schedules, dispatches and
//! commits source fetches.
//!
//! One long-lived loop owns the in-flight set and a cache of enabled
//! sources. Each due source runs as its own task doing the whole
//! fetch, commit and write-back sequence; a semaphore bounds how many of
//! them hold a network slot at once.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::{FutureExt, StreamExt};
use tokio::sync::{Notify, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::cancel::{FetchContext, Shutdown};
use super::error::{ErrorClass, FetchError};
use super::feed::FeedProcessor;
use super::health::HealthTracker;
use super::http::HttpFetcher;
use super::outcome::{FetchOutcome, FetchReport};
use super::scheduler::Scheduler;
use super::scraper::ScraperProcessor;
use crate::config::DiscoveryConfig;
use crate::item::ItemStore;
use crate::source::{CacheValidators, Source, SourceId, SourceKind, SourceStore};
use crate::{NewsdeskError, Result};

/// Time aborted fetches get to unwind before their tasks are killed.
const ABORT_SETTLE: Duration = Duration::from_secs(5);

/// Result of one source fetch.
#[derive(Debug, Clone)]
pub struct SourceRun {
    pub source_id: SourceId,
    pub url: String,
    pub outcome: FetchOutcome,
    /// The source after write-back; `None` if the fetch was discarded.
    pub updated: Option<Source>,
}

/// Process-level controls for a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    stop: Shutdown,
    abort: Shutdown,
    reload: Arc<Notify>,
}

impl EngineHandle {
    fn new() -> Self {
        Self {
            stop: Shutdown::new(),
            abort: Shutdown::new(),
            reload: Arc::new(Notify::new()),
        }
    }

    /// Stop dispatching and drain in-flight fetches.
    pub fn shutdown(&self) {
        self.stop.trigger();
    }

    /// Re-list enabled sources now instead of at the next relist.
    pub fn reload(&self) {
        self.reload.notify_one();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.stop.is_triggered()
    }
}

struct Shared {
    config: DiscoveryConfig,
    sources: Arc<dyn SourceStore>,
    items: Arc<dyn ItemStore>,
    http: HttpFetcher,
    scheduler: Scheduler,
    health: HealthTracker,
    /// Read-held by every running commit.
    commit_gate: Arc<RwLock<()>>,
}

/// How a dispatched task ended.
enum TaskDone {
    Finished(SourceRun),
    /// The source was disabled or deleted after it was listed.
    Skipped(SourceId),
    /// Shutdown arrived before the task got a fetch slot.
    NotStarted(SourceId),
}

/// The discovery engine.
pub struct Engine {
    shared: Arc<Shared>,
    handle: EngineHandle,
    permits: Arc<Semaphore>,
}

impl Engine {
    pub fn new(
        config: DiscoveryConfig,
        sources: Arc<dyn SourceStore>,
        items: Arc<dyn ItemStore>,
    ) -> Result<Self> {
        let http = HttpFetcher::new(&config)?;
        let scheduler = Scheduler::new(config.default_polling_interval());
        let health = HealthTracker::new(config.disable_threshold);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1)));

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                sources,
                items,
                http,
                scheduler,
                health,
                commit_gate: Arc::new(RwLock::new(())),
            }),
            handle: EngineHandle::new(),
            permits,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Run until shutdown is requested, then drain.
    pub async fn run(&self) -> Result<()> {
        let config = &self.shared.config;
        info!(
            "Discovery engine started (max {} concurrent fetches, tick {}s, relist {}s)",
            config.max_concurrent_fetches, config.tick_interval_secs, config.relist_interval_secs
        );

        let mut sources = self.list_sources().await.unwrap_or_default();
        let mut last_relist = Instant::now();
        let mut in_flight: HashSet<SourceId> = HashSet::new();
        let mut tasks: JoinSet<TaskDone> = JoinSet::new();

        let mut timer = interval(config.tick_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.handle.stop.triggered() => break,
                _ = self.handle.reload.notified() => {
                    info!("Reload requested, re-listing sources");
                    if let Some(listed) = self.list_sources().await {
                        sources = listed;
                    }
                    last_relist = Instant::now();
                    self.dispatch(&sources, &mut in_flight, &mut tasks);
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    finish(joined, &mut in_flight, &mut sources);
                }
                _ = timer.tick() => {
                    if last_relist.elapsed() >= config.relist_interval() {
                        if let Some(listed) = self.list_sources().await {
                            sources = listed;
                        }
                        last_relist = Instant::now();
                    }
                    self.dispatch(&sources, &mut in_flight, &mut tasks);
                }
            }
        }

        self.drain(&mut tasks, &mut in_flight, &mut sources).await;
        info!("Discovery engine stopped");
        Ok(())
    }

    /// Run a single cycle over every due source and return when all are done.
    pub async fn run_once(&self) -> Result<Vec<SourceRun>> {
        let sources = self.shared.sources.list_enabled().await?;
        let now = Utc::now();
        let due: Vec<Source> = self
            .shared
            .scheduler
            .due(&sources, &HashSet::new(), now)
            .into_iter()
            .cloned()
            .collect();
        info!("{} of {} enabled sources due", due.len(), sources.len());

        let concurrency = self.shared.config.max_concurrent_fetches.max(1);
        let runs = futures::stream::iter(due)
            .map(|source| {
                let shared = Arc::clone(&self.shared);
                let abort = self.handle.abort.clone();
                async move {
                    let ctx = abort.context(shared.config.fetch_timeout());
                    shared.fetch(&ctx, source).await
                }
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(runs.into_iter().flatten().collect())
    }

    /// Fetch one source immediately, regardless of its schedule.
    pub async fn fetch_now(&self, source: Source) -> Option<SourceRun> {
        let ctx = self.handle.abort.context(self.shared.config.fetch_timeout());
        Arc::clone(&self.shared).fetch(&ctx, source).await
    }

    async fn list_sources(&self) -> Option<Vec<Source>> {
        match self.shared.sources.list_enabled().await {
            Ok(sources) => {
                debug!("Listed {} enabled sources", sources.len());
                Some(sources)
            }
            Err(e) => {
                error!("Failed to list enabled sources: {}", e);
                None
            }
        }
    }

    fn dispatch(
        &self,
        sources: &[Source],
        in_flight: &mut HashSet<SourceId>,
        tasks: &mut JoinSet<TaskDone>,
    ) {
        let due: Vec<Source> = self
            .shared
            .scheduler
            .due(sources, in_flight, Utc::now())
            .into_iter()
            .cloned()
            .collect();
        if due.is_empty() {
            return;
        }
        debug!("Dispatching {} due source(s)", due.len());

        for source in due {
            in_flight.insert(source.id);
            tasks.spawn(run_task(
                Arc::clone(&self.shared),
                source,
                Arc::clone(&self.permits),
                self.handle.clone(),
            ));
        }
    }

    async fn drain(
        &self,
        tasks: &mut JoinSet<TaskDone>,
        in_flight: &mut HashSet<SourceId>,
        sources: &mut Vec<Source>,
    ) {
        if tasks.is_empty() {
            return;
        }
        let grace = self.shared.config.shutdown_grace();
        info!(
            "Waiting up to {}s for {} in-flight fetch(es)",
            grace.as_secs(),
            tasks.len()
        );

        let finished = timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                finish(joined, in_flight, sources);
            }
        })
        .await;
        if finished.is_ok() {
            return;
        }

        warn!(
            "Abandoning {} fetch(es) still running after {}s",
            tasks.len(),
            grace.as_secs()
        );
        self.handle.abort.trigger();
        let _ = timeout(ABORT_SETTLE, async {
            while let Some(joined) = tasks.join_next().await {
                finish(joined, in_flight, sources);
            }
        })
        .await;
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        // Commits already under way outlive their aborted tasks.
        let _settled = self.shared.commit_gate.write().await;
    }
}

async fn run_task(
    shared: Arc<Shared>,
    source: Source,
    permits: Arc<Semaphore>,
    handle: EngineHandle,
) -> TaskDone {
    let id = source.id;
    let permit = tokio::select! {
        biased;
        _ = handle.stop.triggered() => return TaskDone::NotStarted(id),
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return TaskDone::NotStarted(id),
        },
    };

    let ctx = handle.abort.context(shared.config.fetch_timeout());
    let result = AssertUnwindSafe(shared.fetch(&ctx, source))
        .catch_unwind()
        .await;
    drop(permit);

    match result {
        Ok(Some(run)) => TaskDone::Finished(run),
        Ok(None) => TaskDone::Skipped(id),
        Err(_) => {
            error!("Fetch task for source {} panicked", id);
            TaskDone::NotStarted(id)
        }
    }
}

/// Apply a finished task to the loop state.
fn finish(
    joined: std::result::Result<TaskDone, tokio::task::JoinError>,
    in_flight: &mut HashSet<SourceId>,
    sources: &mut Vec<Source>,
) {
    match joined {
        Ok(TaskDone::Finished(run)) => {
            in_flight.remove(&run.source_id);
            if let Some(updated) = run.updated {
                if updated.is_enabled() {
                    if let Some(slot) = sources.iter_mut().find(|s| s.id == updated.id) {
                        *slot = updated;
                    }
                } else {
                    sources.retain(|s| s.id != updated.id);
                }
            }
        }
        Ok(TaskDone::Skipped(id)) => {
            in_flight.remove(&id);
            sources.retain(|s| s.id != id);
        }
        Ok(TaskDone::NotStarted(id)) => {
            in_flight.remove(&id);
        }
        Err(e) => error!("Fetch task failed: {}", e),
    }
}

impl Shared {
    /// Fetch, commit and write back one source.
    ///
    /// Returns `None` if the source was disabled or deleted since it was
    /// listed.
    async fn fetch(self: Arc<Self>, ctx: &FetchContext, listed: Source) -> Option<SourceRun> {
        let id = listed.id;
        let source = match self.sources.get(id).await {
            Ok(source) if source.is_enabled() => source,
            Ok(_) => {
                debug!("Source {} was disabled, skipping", id);
                return None;
            }
            Err(NewsdeskError::NotFound(_)) => {
                debug!("Source {} was deleted, skipping", id);
                return None;
            }
            Err(e) => {
                // Fall back to the listed copy; the write-back will tell.
                warn!("Failed to refresh source {}: {}", id, e);
                listed
            }
        };

        let started = Instant::now();
        let processed = ctx.guard(self.process(ctx, &source)).await;

        // Commit and write-back run as one unit in their own task, so an
        // abandoned fetch either commits everything or nothing.
        let gate = Arc::clone(&self.commit_gate).read_owned().await;
        let shared = Arc::clone(&self);
        let settle_ctx = ctx.clone();
        let url = source.url.clone();
        let settled = tokio::spawn(async move {
            let _gate = gate;
            shared.settle(&settle_ctx, source, processed, started).await
        })
        .await;

        match settled {
            Ok(run) => Some(run),
            Err(e) => {
                error!("Commit of {} failed: {}", url, e);
                Some(SourceRun {
                    source_id: id,
                    url,
                    outcome: FetchOutcome::Failed(FetchError::Storage(e.to_string())),
                    updated: None,
                })
            }
        }
    }

    /// Commit a processed fetch, record its health and log the result.
    async fn settle(
        &self,
        ctx: &FetchContext,
        source: Source,
        processed: std::result::Result<FetchReport, FetchError>,
        started: Instant,
    ) -> SourceRun {
        let (outcome, cache) = match processed {
            Ok(report) => self.commit(ctx, &source, report).await,
            Err(e) => (FetchOutcome::Failed(e), None),
        };

        if let FetchOutcome::Failed(FetchError::Cancelled) = outcome {
            info!("Discarded fetch of {} (shutdown)", source.url);
            return SourceRun {
                source_id: source.id,
                url: source.url,
                outcome,
                updated: None,
            };
        }

        let updated = self.write_back(&source, &outcome, cache).await;
        match &outcome {
            FetchOutcome::Success { new_items } => {
                info!("Fetched {}: {} new items", source.url, new_items);
            }
            FetchOutcome::NotModified => {
                info!("Fetched {}: 0 new items (not modified)", source.url);
            }
            FetchOutcome::Failed(e) if e.class() == ErrorClass::Fatal => {
                error!("Failed to fetch {}: {}", source.url, e);
            }
            FetchOutcome::Failed(e) => {
                warn!("Failed to fetch {}: {}", source.url, e);
            }
        }
        debug!("Fetch of {} took {:?}", source.url, started.elapsed());

        SourceRun {
            source_id: source.id,
            url: source.url,
            outcome,
            updated,
        }
    }

    /// Single dispatch point over source kinds.
    async fn process(
        &self,
        ctx: &FetchContext,
        source: &Source,
    ) -> std::result::Result<FetchReport, FetchError> {
        let now = Utc::now();
        match &source.kind {
            SourceKind::Feed(_) => {
                FeedProcessor::new(&self.http, self.items.as_ref())
                    .process(ctx, source, now)
                    .await
            }
            SourceKind::Website(config) => {
                ScraperProcessor::new(&self.http, self.items.as_ref())
                    .process(ctx, source, config, now)
                    .await
            }
        }
    }

    /// Persist the report's items. A fetch past its deadline commits nothing.
    async fn commit(
        &self,
        ctx: &FetchContext,
        source: &Source,
        report: FetchReport,
    ) -> (FetchOutcome, Option<CacheValidators>) {
        if let Err(e) = ctx.check() {
            return (FetchOutcome::Failed(e), None);
        }
        if report.not_modified {
            return (FetchOutcome::NotModified, None);
        }

        let stats = report.stats;
        debug!(
            "{}: {} discovered, {} capped, {} duplicate, {} rejected, {} article failures",
            source.url,
            stats.discovered,
            stats.capped,
            stats.duplicates,
            stats.rejected,
            stats.article_failures
        );

        let mut added = 0;
        for mut item in report.items {
            item.discovered_at = Utc::now();
            match self.items.add(&item).await {
                Ok(()) => added += 1,
                Err(NewsdeskError::DuplicateItem(url)) => {
                    debug!("Skipping {}: already stored by another source", url);
                }
                Err(e) => return (FetchOutcome::Failed(e.into()), None),
            }
        }

        (FetchOutcome::Success { new_items: added }, report.cache)
    }

    async fn write_back(
        &self,
        source: &Source,
        outcome: &FetchOutcome,
        cache: Option<CacheValidators>,
    ) -> Option<Source> {
        let transition = self.health.record(source, outcome, Utc::now())?;
        let mut update = transition.update;
        if let Some(cache) = cache {
            update = update.with_cache(cache);
        }

        if transition.disabled {
            warn!(
                "Disabled source {} ({}) after {} consecutive failure(s): {}",
                source.id,
                source.url,
                update.fetch_error_count.unwrap_or_default(),
                update
                    .last_error
                    .as_ref()
                    .and_then(|e| e.as_deref())
                    .unwrap_or("unknown error")
            );
        }

        if let Err(e) = self.sources.update(source.id, &update).await {
            error!("Failed to update source {}: {}", source.id, e);
        }

        let mut updated = source.clone();
        update.apply_to(&mut updated);
        Some(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::testing::{hour, item_store, local_config, rss, serve, MemorySources};
    use crate::item::{FileItemStore, Item};
    use crate::source::fixtures::feed_source;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    async fn fixture_site() -> String {
        let feed = rss(&[
            ("One".to_string(), "http://example.com/1".to_string(), Some(hour(1))),
            ("Two".to_string(), "http://example.com/2".to_string(), Some(hour(2))),
            ("Three".to_string(), "http://example.com/3".to_string(), Some(hour(3))),
        ]);
        let router = Router::new()
            .route("/feed.xml", get(move || async move { feed }))
            .route("/gone", get(|| async { StatusCode::NOT_FOUND }))
            .route("/flaky", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            );
        serve(router).await
    }

    async fn engine(
        config: DiscoveryConfig,
        sources: Vec<Source>,
    ) -> (TempDir, Engine, Arc<MemorySources>, Arc<FileItemStore>) {
        let (dir, store) = item_store().await;
        let store = Arc::new(store);
        let memory = Arc::new(MemorySources::with(sources));
        let engine = Engine::new(config, memory.clone(), store.clone()).unwrap();
        (dir, engine, memory, store)
    }

    /// File store whose writes each take `delay`.
    struct SlowItems {
        inner: FileItemStore,
        delay: Duration,
        adds: AtomicUsize,
    }

    #[async_trait]
    impl ItemStore for SlowItems {
        async fn exists(&self, url: &str) -> Result<bool> {
            self.inner.exists(url).await
        }

        async fn add(&self, item: &Item) -> Result<()> {
            self.adds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inner.add(item).await
        }

        async fn list(&self) -> Result<Vec<Item>> {
            self.inner.list().await
        }
    }

    #[test]
    fn test_finish_applies_task_results() {
        let mut sources = vec![
            feed_source(1, "http://example.com/a"),
            feed_source(2, "http://example.com/b"),
            feed_source(3, "http://example.com/c"),
        ];
        let mut in_flight: HashSet<SourceId> = [1, 2, 3].into_iter().collect();

        let mut fetched = sources[0].clone();
        fetched.last_fetched_at = Some(Utc::now());
        let run = SourceRun {
            source_id: 1,
            url: fetched.url.clone(),
            outcome: FetchOutcome::Success { new_items: 2 },
            updated: Some(fetched.clone()),
        };
        finish(Ok(TaskDone::Finished(run)), &mut in_flight, &mut sources);
        assert!(!in_flight.contains(&1));
        assert_eq!(sources[0], fetched);

        finish(Ok(TaskDone::Skipped(2)), &mut in_flight, &mut sources);
        assert!(!in_flight.contains(&2));
        assert!(sources.iter().all(|s| s.id != 2));

        finish(Ok(TaskDone::NotStarted(3)), &mut in_flight, &mut sources);
        assert!(in_flight.is_empty());
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn test_finish_drops_disabled_source() {
        let mut sources = vec![feed_source(1, "http://example.com/a")];
        let mut in_flight: HashSet<SourceId> = [1].into_iter().collect();
        let mut disabled = sources[0].clone();
        disabled.enabled_at = None;

        let run = SourceRun {
            source_id: 1,
            url: disabled.url.clone(),
            outcome: FetchOutcome::Failed(FetchError::Http { status: 404 }),
            updated: Some(disabled),
        };
        finish(Ok(TaskDone::Finished(run)), &mut in_flight, &mut sources);
        assert!(sources.is_empty());
        assert!(in_flight.is_empty());
    }

    #[test]
    fn test_handle_signals() {
        let handle = EngineHandle::new();
        assert!(!handle.is_shutting_down());
        handle.shutdown();
        assert!(handle.is_shutting_down());
        assert!(!handle.abort.is_triggered());
    }

    #[tokio::test]
    async fn test_fetch_now_commits_and_writes_back() {
        let base = fixture_site().await;
        let source = feed_source(1, &format!("{base}/feed.xml"));
        let (_dir, engine, memory, items) = engine(local_config(), vec![source.clone()]).await;

        let run = engine.fetch_now(source).await.unwrap();
        assert_eq!(run.outcome, FetchOutcome::Success { new_items: 3 });
        assert_eq!(items.len().await, 3);

        let stored = memory.snapshot(1);
        assert!(stored.last_fetched_at.is_some());
        assert_eq!(stored.fetch_error_count, 0);
        assert_eq!(run.updated.as_ref(), Some(&stored));

        // Everything is known now.
        let mut again = stored.clone();
        again.last_fetched_at = None;
        let run = engine.fetch_now(again).await.unwrap();
        assert_eq!(run.outcome, FetchOutcome::Success { new_items: 0 });
        assert_eq!(items.len().await, 3);
    }

    #[tokio::test]
    async fn test_fetch_now_skips_disabled_and_deleted_sources() {
        let base = fixture_site().await;
        let mut disabled = feed_source(1, &format!("{base}/feed.xml"));
        disabled.enabled_at = None;
        let (_dir, engine, _memory, items) = engine(local_config(), vec![disabled.clone()]).await;

        let mut listed = disabled.clone();
        listed.enabled_at = Some(Utc::now());
        assert!(engine.fetch_now(listed).await.is_none());

        let deleted = feed_source(9, &format!("{base}/feed.xml"));
        assert!(engine.fetch_now(deleted).await.is_none());
        assert!(items.is_empty().await);
    }

    #[tokio::test]
    async fn test_permanent_failure_disables_source() {
        let base = fixture_site().await;
        let source = feed_source(1, &format!("{base}/gone"));
        let (_dir, engine, memory, _items) = engine(local_config(), vec![source.clone()]).await;

        let run = engine.fetch_now(source).await.unwrap();
        assert_eq!(run.outcome, FetchOutcome::Failed(FetchError::Http { status: 404 }));

        let stored = memory.snapshot(1);
        assert!(!stored.is_enabled());
        assert_eq!(stored.fetch_error_count, 1);
        assert!(stored.last_error.is_some());
    }

    #[tokio::test]
    async fn test_transient_failures_disable_at_threshold() {
        let base = fixture_site().await;
        let config = DiscoveryConfig {
            disable_threshold: 3,
            ..local_config()
        };
        let source = feed_source(1, &format!("{base}/flaky"));
        let (_dir, engine, memory, _items) = engine(config, vec![source]).await;

        for attempt in 1..=3u32 {
            let current = memory.snapshot(1);
            assert!(current.is_enabled());
            engine.fetch_now(current).await.unwrap();
            assert_eq!(memory.snapshot(1).fetch_error_count, attempt);
        }
        assert!(!memory.snapshot(1).is_enabled());
    }

    #[tokio::test]
    async fn test_timeout_commits_nothing() {
        let base = fixture_site().await;
        let config = DiscoveryConfig {
            fetch_timeout_secs: 1,
            request_timeout_secs: 1,
            ..local_config()
        };
        let source = feed_source(1, &format!("{base}/slow"));
        let (_dir, engine, memory, items) = engine(config, vec![source.clone()]).await;

        let run = engine.fetch_now(source).await.unwrap();
        assert_eq!(run.outcome, FetchOutcome::Failed(FetchError::Timeout));
        assert!(items.is_empty().await);

        let stored = memory.snapshot(1);
        assert!(stored.is_enabled());
        assert_eq!(stored.fetch_error_count, 1);
    }

    #[tokio::test]
    async fn test_run_once_fetches_only_due_sources() {
        let base = fixture_site().await;
        let due = feed_source(1, &format!("{base}/feed.xml"));
        let mut fresh = feed_source(2, &format!("{base}/gone"));
        fresh.last_fetched_at = Some(Utc::now());
        let (_dir, engine, memory, items) = engine(local_config(), vec![due, fresh]).await;

        let runs = engine.run_once().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].source_id, 1);
        assert_eq!(items.len().await, 3);
        assert!(memory.snapshot(2).is_enabled());
    }

    #[tokio::test]
    async fn test_run_dispatches_then_stops_on_shutdown() {
        let base = fixture_site().await;
        let source = feed_source(1, &format!("{base}/feed.xml"));
        let config = DiscoveryConfig {
            tick_interval_secs: 1,
            ..local_config()
        };
        let (_dir, engine, memory, items) = engine(config, vec![source]).await;
        let engine = Arc::new(engine);
        let handle = engine.handle();

        let runner = Arc::clone(&engine);
        let task = tokio::spawn(async move { runner.run().await });

        let deadline = Instant::now() + Duration::from_secs(10);
        while memory.snapshot(1).last_fetched_at.is_none() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(memory.snapshot(1).last_fetched_at.is_some());
        assert_eq!(items.len().await, 3);

        handle.shutdown();
        let stopped = timeout(Duration::from_secs(10), task).await;
        assert!(matches!(stopped, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_already_stopped() {
        let (_dir, engine, _memory, items) = engine(local_config(), vec![]).await;
        engine.handle().shutdown();
        timeout(Duration::from_secs(5), engine.run())
            .await
            .unwrap()
            .unwrap();
        assert!(items.is_empty().await);
    }

    #[tokio::test]
    async fn test_drain_completes_commit_in_progress() {
        let base = fixture_site().await;
        let config = DiscoveryConfig {
            tick_interval_secs: 1,
            shutdown_grace_secs: 1,
            ..local_config()
        };
        let (_dir, inner) = item_store().await;
        let items = Arc::new(SlowItems {
            inner,
            delay: Duration::from_secs(3),
            adds: AtomicUsize::new(0),
        });
        let memory = Arc::new(MemorySources::with(vec![feed_source(
            1,
            &format!("{base}/feed.xml"),
        )]));
        let engine = Arc::new(Engine::new(config, memory.clone(), items.clone()).unwrap());
        let handle = engine.handle();

        let runner = Arc::clone(&engine);
        let task = tokio::spawn(async move { runner.run().await });

        let deadline = Instant::now() + Duration::from_secs(10);
        while items.adds.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(items.adds.load(Ordering::SeqCst), 1);

        // Grace and abort settle both run out while the three writes are
        // still going; the commit and its write-back finish regardless.
        handle.shutdown();
        let stopped = timeout(Duration::from_secs(30), task).await;
        assert!(matches!(stopped, Ok(Ok(Ok(())))));

        assert_eq!(items.inner.len().await, 3);
        let stored = memory.snapshot(1);
        assert!(stored.last_fetched_at.is_some());
        assert_eq!(stored.fetch_error_count, 0);
    }
}
