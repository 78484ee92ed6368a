//! Due-time computation for sources.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::source::{Source, SourceId};

/// Whether a source last fetched at `last_fetched_at` is due at `now`.
///
/// Never-fetched sources are always due.
pub fn is_due(now: DateTime<Utc>, last_fetched_at: Option<DateTime<Utc>>, interval: Duration) -> bool {
    match last_fetched_at {
        None => true,
        Some(last) => next_due(last, interval).is_some_and(|due| now >= due),
    }
}

fn next_due(last: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    let interval = chrono::Duration::from_std(interval).ok()?;
    last.checked_add_signed(interval)
}

/// Picks due sources from the enabled set.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    default_interval: Duration,
}

impl Scheduler {
    pub fn new(default_interval: Duration) -> Self {
        Self { default_interval }
    }

    pub fn interval_for(&self, source: &Source) -> Duration {
        source.effective_polling_interval(self.default_interval)
    }

    pub fn is_source_due(&self, source: &Source, now: DateTime<Utc>) -> bool {
        source.is_enabled() && is_due(now, source.last_fetched_at, self.interval_for(source))
    }

    /// Due sources that are not already being fetched, in input order.
    pub fn due<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a Source>,
        in_flight: &HashSet<SourceId>,
        now: DateTime<Utc>,
    ) -> Vec<&'a Source> {
        sources
            .into_iter()
            .filter(|s| !in_flight.contains(&s.id))
            .filter(|s| self.is_source_due(s, now))
            .collect()
    }
}
