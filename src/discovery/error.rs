//! Fetch and validation errors for the discovery engine.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::NewsdeskError;

/// How a fetch failure affects source health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried on the next scheduled cycle, counted toward auto-disable.
    Transient,
    /// Disables the source immediately.
    Permanent,
    /// Unexpected failure on our side; logged, health untouched.
    Fatal,
}

/// Error from fetching or processing one source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("fetch timed out")]
    Timeout,

    /// Shutdown aborted the fetch. Its result is discarded.
    #[error("fetch cancelled by shutdown")]
    Cancelled,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP error: {status}")]
    Http { status: u16 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("response too large: {size} bytes (max {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("storage error: {0}")]
    Storage(String),
}

impl FetchError {
    /// Classify the error for the health state machine.
    ///
    /// `Cancelled` never reaches the health tracker; it reports as transient
    /// only so the match stays total.
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::Timeout | FetchError::Network(_) | FetchError::Cancelled => {
                ErrorClass::Transient
            }
            FetchError::Http { status } if *status >= 500 || *status == 429 => {
                ErrorClass::Transient
            }
            FetchError::Http { .. }
            | FetchError::Parse(_)
            | FetchError::InvalidUrl(_)
            | FetchError::TooLarge { .. } => ErrorClass::Permanent,
            FetchError::Storage(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl From<NewsdeskError> for FetchError {
    fn from(err: NewsdeskError) -> Self {
        FetchError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Http {
                status: status.as_u16(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Reason a scraped candidate was dropped.
///
/// Candidate-level only: the fetch that produced it still succeeds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty title")]
    EmptyTitle,

    #[error("title too long: {0} characters")]
    TitleTooLong(usize),

    #[error("invalid article URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("article host {found} does not match source host {expected}")]
    HostMismatch { expected: String, found: String },

    #[error("date {0} is before 1990-01-01")]
    DateTooOld(DateTime<Utc>),

    #[error("date {0} is in the future")]
    DateInFuture(DateTime<Utc>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_classification() {
        assert_eq!(FetchError::Http { status: 500 }.class(), ErrorClass::Transient);
        assert_eq!(FetchError::Http { status: 503 }.class(), ErrorClass::Transient);
        assert_eq!(FetchError::Http { status: 429 }.class(), ErrorClass::Transient);
        assert_eq!(FetchError::Http { status: 404 }.class(), ErrorClass::Permanent);
        assert_eq!(FetchError::Http { status: 410 }.class(), ErrorClass::Permanent);
        assert_eq!(FetchError::Http { status: 403 }.class(), ErrorClass::Permanent);
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(FetchError::Timeout.class(), ErrorClass::Transient);
        assert_eq!(
            FetchError::Network("connection refused".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            FetchError::Parse("not a feed".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            FetchError::InvalidUrl("ftp://x".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            FetchError::TooLarge { size: 10, limit: 5 }.class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            FetchError::Storage("disk full".into()).class(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: FetchError = NewsdeskError::Database("locked".into()).into();
        assert!(matches!(err, FetchError::Storage(ref msg) if msg.contains("locked")));
        assert!(!err.is_cancelled());
        assert!(FetchError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(FetchError::Http { status: 404 }.to_string(), "HTTP error: 404");
        assert_eq!(
            ValidationError::HostMismatch {
                expected: "example.com".into(),
                found: "evil.com".into()
            }
            .to_string(),
            "article host evil.com does not match source host example.com"
        );
    }
}
