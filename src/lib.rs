//! # gitlab-dl
//!
//! Resilient parallel GitLab code search and download pipeline.
//!
//! gitlab-dl enumerates blob search results from a GitLab instance, resolves
//! each result to its owning project, and downloads the matching files to a
//! local output directory — tolerating an unreliable, rate-limited backend.
//!
//! ## Design Philosophy
//!
//! - **Resilient** - Rate limits and transient failures are retried with
//!   exponential backoff; one failing file never aborts the run
//! - **Idempotent** - A resume ledger makes re-runs skip everything already
//!   downloaded, without issuing network calls for those files
//! - **Pipelined** - Downloads run while later result pages are still being
//!   enumerated; project metadata is pre-fetched with its own concurrency
//!   bound
//! - **Event-driven** - Consumers subscribe to progress events, no polling
//!   required
//!
//! ## Quick Start
//!
//! ```no_run
//! use gitlab_dl::{Config, GitLabApi, SearchDownloader};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("gitlab.example.com", "GeneratedValue");
//!     let api = Arc::new(GitLabApi::new(&config.hostname, config.token.clone())?);
//!
//!     let downloader = SearchDownloader::new(config, api).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = downloader.run().await?;
//!     println!("{} downloaded, {} skipped, {} failed",
//!         summary.success, summary.skipped, summary.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Remote code-host API boundary
pub mod api;
/// Configuration types
pub mod config;
/// Paginated search result enumeration
pub mod enumerator;
/// Error types
pub mod error;
/// Resume ledger for idempotent re-runs
pub mod ledger;
/// Pipeline orchestration (worker pool, scheduling)
pub mod pipeline;
/// Progress and outcome accounting
pub mod progress;
/// Coalescing project metadata cache
pub mod project_cache;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Local filename sanitizing
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use api::{CodeHostApi, GitLabApi};
pub use config::{ATTEMPT_LOG_FILE_NAME, Config, METADATA_FILE_NAME, RetryConfig};
pub use error::{Error, ErrorKind, Result};
pub use ledger::ResumeLedger;
pub use pipeline::SearchDownloader;
pub use progress::{AttemptLog, HitReport, ProgressAccountant};
pub use project_cache::ProjectCache;
pub use types::{
    DownloadOutcome, Event, MetadataRecord, OutcomeStatus, ProjectId, ProjectRecord, SearchHit,
    SkipReason, Summary,
};
