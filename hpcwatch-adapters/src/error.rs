//! Error types for source adapters.

use std::fmt;

use thiserror::Error;

/// Why a fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchCause {
    /// Connection refused, DNS failure or timeout.
    Unreachable,
    /// The backend answered but refused the request: non-success status,
    /// authentication failure or a query it could not execute.
    Rejected,
    /// The response could not be decoded.
    Malformed,
    /// The warehouse schema does not have what the query needs.
    SchemaMismatch,
}

impl FetchCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchCause::Unreachable => "unreachable",
            FetchCause::Rejected => "rejected",
            FetchCause::Malformed => "malformed",
            FetchCause::SchemaMismatch => "schema-mismatch",
        }
    }
}

impl fmt::Display for FetchCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed adapter call.
///
/// Every failure mode of a source collapses into this one type, tagged with
/// a [`FetchCause`]. Callers decide per call site whether to abort or to
/// fall back to a default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{cause}: {message}")]
pub struct FetchError {
    pub cause: FetchCause,
    pub message: String,
}

impl FetchError {
    pub fn new(cause: FetchCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(FetchCause::Unreachable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FetchCause::Rejected, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FetchCause::Malformed, message)
    }

    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::new(FetchCause::SchemaMismatch, message)
    }
}

#[cfg(feature = "metrics")]
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::unreachable(format!("request timed out: {err}"))
        } else if err.is_connect() {
            FetchError::unreachable(format!("connection failed: {err}"))
        } else if err.is_decode() {
            FetchError::malformed(err.to_string())
        } else {
            FetchError::rejected(err.to_string())
        }
    }
}

#[cfg(feature = "warehouse")]
impl From<sqlx::Error> for FetchError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => FetchError::unreachable(err.to_string()),
            sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::RowNotFound => FetchError::malformed(err.to_string()),
            _ => FetchError::rejected(err.to_string()),
        }
    }
}
