//! Source health state machine.
//!
//! ```text
//! Healthy --transient--> Degraded(n) --n >= threshold--> Disabled
//! Healthy/Degraded --permanent--> Disabled
//! any --success--> Healthy
//! ```
//!
//! This is the only place that changes a source's error count, last error
//! or (automatically) its enabled timestamp.

use chrono::{DateTime, Utc};

use super::error::ErrorClass;
use super::outcome::FetchOutcome;
use crate::source::{Source, SourceUpdate};

/// Health of a source, derived from its stored fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    /// Consecutive failures so far.
    Degraded(u32),
    Disabled,
}

impl Health {
    pub fn of(source: &Source) -> Self {
        if !source.is_enabled() {
            Health::Disabled
        } else if source.fetch_error_count > 0 {
            Health::Degraded(source.fetch_error_count)
        } else {
            Health::Healthy
        }
    }
}

/// Result of recording one fetch outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Metadata write-back for the attempt.
    pub update: SourceUpdate,
    pub health: Health,
    /// The source was disabled by this attempt.
    pub disabled: bool,
}

/// Applies fetch outcomes to source health.
#[derive(Debug, Clone, Copy)]
pub struct HealthTracker {
    disable_threshold: u32,
}

impl HealthTracker {
    pub fn new(disable_threshold: u32) -> Self {
        Self {
            disable_threshold: disable_threshold.max(1),
        }
    }

    pub fn disable_threshold(&self) -> u32 {
        self.disable_threshold
    }

    /// Compute the write-back for an attempt that finished at `now`.
    ///
    /// Returns `None` for a cancelled fetch, which must leave no trace.
    /// Fatal errors record the attempt time only.
    pub fn record(
        &self,
        source: &Source,
        outcome: &FetchOutcome,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        let update = SourceUpdate::new().with_last_fetched_at(now);

        let error = match outcome {
            FetchOutcome::Success { .. } | FetchOutcome::NotModified => {
                return Some(Transition {
                    update: update.with_error_count(0).with_last_error(None),
                    health: Health::Healthy,
                    disabled: false,
                });
            }
            FetchOutcome::Failed(error) if error.is_cancelled() => return None,
            FetchOutcome::Failed(error) => error,
        };

        let count = source.fetch_error_count.saturating_add(1);
        let failed = update
            .with_error_count(count)
            .with_last_error(Some(error.to_string()));

        let disable = match error.class() {
            ErrorClass::Fatal => {
                return Some(Transition {
                    update: SourceUpdate::new().with_last_fetched_at(now),
                    health: Health::of(source),
                    disabled: false,
                });
            }
            ErrorClass::Permanent => true,
            ErrorClass::Transient => count >= self.disable_threshold,
        };

        if disable && source.is_enabled() {
            Some(Transition {
                update: failed.with_enabled_at(None),
                health: Health::Disabled,
                disabled: true,
            })
        } else {
            Some(Transition {
                update: failed,
                health: if source.is_enabled() {
                    Health::Degraded(count)
                } else {
                    Health::Disabled
                },
                disabled: false,
            })
        }
    }
}
