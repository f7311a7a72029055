//! Error types for gitlab-dl
//!
//! This module provides error handling for the pipeline, including:
//! - The main [`Error`] type with contextual variants
//! - The stable per-hit outcome taxonomy [`ErrorKind`] used for failure
//!   accounting and the attempt log

use crate::types::ProjectId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for gitlab-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gitlab-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// Network or transport error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend signalled a rate limit (HTTP 429)
    ///
    /// Carries the server-supplied `Retry-After` hint when present. This variant
    /// is always retryable; it only becomes terminal as [`Error::RateLimitExhausted`]
    /// once the retry budget is spent.
    #[error("rate limited by server")]
    RateLimited {
        /// Server-supplied backoff hint, parsed from the `Retry-After` header
        retry_after: Option<Duration>,
    },

    /// Rate-limit retries exhausted for a single operation
    #[error("rate limit retries exhausted after {attempts} attempts")]
    RateLimitExhausted {
        /// Total number of attempts made, including the first
        attempts: u32,
    },

    /// The remote API returned a payload the client cannot parse
    ///
    /// Fatal when raised during result enumeration: it means the search API
    /// contract is broken and continuing could silently miss results.
    #[error("malformed API response: {0}")]
    MalformedResponse(String),

    /// Project metadata lookup failed for a project
    #[error("failed to resolve project {project_id}: {message}")]
    ProjectResolution {
        /// The project whose metadata could not be resolved
        project_id: ProjectId,
        /// Description of the underlying failure
        message: String,
    },

    /// Authentication or authorization failure (never retried)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Remote resource not found (never retried)
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Classify this error into the stable per-hit outcome taxonomy
    ///
    /// Every terminal per-hit failure maps to exactly one [`ErrorKind`], so
    /// failure counts and the attempt log stay consistent across runs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RateLimitExhausted { .. } => ErrorKind::RateLimitExhausted,
            Error::ProjectResolution { .. } => ErrorKind::ProjectResolutionError,
            Error::MalformedResponse(_) | Error::Serialization(_) => ErrorKind::MalformedResponse,
            Error::Io(_) => ErrorKind::LocalWriteError,
            // Everything else that reaches a per-hit outcome came from the
            // remote side: transport failures, auth, not-found, cancellation.
            _ => ErrorKind::NetworkError,
        }
    }
}

/// Stable taxonomy of per-hit failure causes
///
/// `MalformedResponse` is special: when it originates from result enumeration
/// it aborts the whole run instead of producing a per-hit outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rate-limit signals persisted past the retry budget
    RateLimitExhausted,
    /// Transport-level failure (timeout, refused connection, HTTP error)
    NetworkError,
    /// The owning project's metadata could not be resolved
    ProjectResolutionError,
    /// The API returned an unparseable payload
    MalformedResponse,
    /// Writing the downloaded content to the local filesystem failed
    LocalWriteError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::RateLimitExhausted => "rate_limit_exhausted",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ProjectResolutionError => "project_resolution_error",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::LocalWriteError => "local_write_error",
        };
        write!(f, "{}", name)
    }
}
