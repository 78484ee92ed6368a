//! Cooperative cancellation for fetches.
//!
//! Global shutdown and the per-fetch timeout are the same mechanism at two
//! scopes: every network call runs through [`FetchContext::guard`], which
//! races it against the fetch deadline and the global abort signal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::error::FetchError;

/// Global abort signal shared by every in-flight fetch.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Abort every fetch holding a context from this signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has been triggered.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once triggered.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Create a fetch context that expires after `timeout`.
    pub fn context(&self, timeout: Duration) -> FetchContext {
        FetchContext {
            abort: self.tx.subscribe(),
            deadline: Instant::now() + timeout,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation scope of a single source fetch.
#[derive(Debug, Clone)]
pub struct FetchContext {
    abort: watch::Receiver<bool>,
    deadline: Instant,
}

impl FetchContext {
    pub fn is_cancelled(&self) -> bool {
        *self.abort.borrow()
    }

    /// Fail fast if the fetch was aborted or its deadline passed.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(FetchError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Err(FetchError::Timeout)
        } else {
            Ok(())
        }
    }

    /// Run `fut` until it completes, the deadline passes, or shutdown aborts it.
    ///
    /// The future is dropped on timeout or abort, which cancels any HTTP
    /// request it was driving.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        self.check()?;
        let mut abort = self.abort.clone();

        tokio::select! {
            biased;
            _ = wait_for_abort(&mut abort) => Err(FetchError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(FetchError::Timeout),
            result = fut => result,
        }
    }
}

async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    let aborted = rx.wait_for(|aborted| *aborted).await.is_ok();
    if !aborted {
        // Sender gone: no abort can ever arrive.
        std::future::pending::<()>().await;
    }
}
