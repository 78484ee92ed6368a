//! Staleness-aware volume cap.
//!
//! A fetch is capped at [`CAP`] candidates when the source has never been
//! fetched or its last fetch is more than [`STALE_AFTER_DAYS`] days old.

use chrono::{DateTime, Duration, Utc};

/// Maximum candidates processed by a capped fetch.
pub const CAP: usize = 20;

/// Age of the last fetch, in days, after which a source counts as stale.
pub const STALE_AFTER_DAYS: i64 = 15;

/// Whether the cap applies to a fetch starting at `now`.
pub fn is_active(last_fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_fetched_at {
        None => true,
        Some(at) => now - at > Duration::days(STALE_AFTER_DAYS),
    }
}

/// Active cap for a fetch, as a candidate limit.
pub fn limit(last_fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<usize> {
    is_active(last_fetched_at, now).then_some(CAP)
}

/// Keep the `limit` most recent candidates.
///
/// Dated candidates come first, newest first; undated ones follow. The
/// sort is stable, so ties keep their original order. Without a limit the
/// candidates are returned untouched.
pub fn most_recent<T, F>(mut candidates: Vec<T>, limit: Option<usize>, date: F) -> Vec<T>
where
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    let Some(limit) = limit else {
        return candidates;
    };
    if candidates.len() <= limit {
        return candidates;
    }

    candidates.sort_by(|a, b| match (date(a), date(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    candidates.truncate(limit);
    candidates
}
