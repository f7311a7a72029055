//! Core types for gitlab-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ErrorKind;

/// Unique identifier for a project on the remote host
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl ProjectId {
    /// Create a new ProjectId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ProjectId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ProjectId> for i64 {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// One matched file reference returned by the search API
///
/// Produced by the result enumerator and consumed exactly once by the download
/// scheduler (or skipped via the resume ledger).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The project owning the matched file
    pub project_id: ProjectId,
    /// Full namespace path of the project; unresolved until the cache lookup
    #[serde(default)]
    pub project_path: Option<String>,
    /// Repository-relative path of the matched file
    pub file_path: String,
    /// Git ref the hit was indexed at; falls back to the project default branch
    #[serde(default)]
    pub ref_name: Option<String>,
}

/// Identity metadata for a project, created once per distinct id
///
/// Shared read-only by all hits referencing the project (`Arc<ProjectRecord>`);
/// lives for the duration of the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Project id
    pub id: ProjectId,
    /// Full namespace path (e.g. "group/subgroup/project")
    pub path: String,
    /// Default branch, used when a hit carries no ref
    pub default_branch: Option<String>,
}

/// Why a hit was skipped without any network call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The file was already materialized by a prior or current run
    AlreadyDownloaded,
}

/// Terminal outcome of processing one search hit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// File fetched and written to local storage
    Success {
        /// Local path the file was written to
        local_path: PathBuf,
        /// Size of the written content in bytes
        bytes: u64,
    },
    /// Hit skipped before any network call
    Skipped {
        /// Why the hit was skipped
        reason: SkipReason,
    },
    /// Hit failed terminally
    Failed {
        /// Classified failure cause
        kind: ErrorKind,
        /// Number of attempts made before giving up (0 when no per-hit
        /// network call was issued, e.g. project resolution failures)
        attempts: u32,
        /// Human-readable error detail for the attempt log
        error: String,
    },
}

impl DownloadOutcome {
    /// Coarse status tag for counters, events and the attempt log
    pub fn status(&self) -> OutcomeStatus {
        match self {
            DownloadOutcome::Success { .. } => OutcomeStatus::Success,
            DownloadOutcome::Skipped { .. } => OutcomeStatus::Skipped,
            DownloadOutcome::Failed { .. } => OutcomeStatus::Failed,
        }
    }
}

/// Coarse per-hit status used by counters and events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Downloaded and written locally
    Success,
    /// Skipped via the resume ledger or on-disk check
    Skipped,
    /// Failed terminally
    Failed,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// One entry of `metadata.json`, mapping a sanitized local filename back to
/// its origin on the remote host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Sanitized filename inside the output directory
    pub local_filename: String,
    /// Full namespace path of the owning project
    pub project_path: String,
    /// Repository-relative path of the file
    pub file_path: String,
    /// Git ref the content was fetched at
    #[serde(rename = "ref")]
    pub ref_name: String,
}

/// Final counter tuple for a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Files downloaded and written
    pub success: u64,
    /// Hits skipped as already downloaded
    pub skipped: u64,
    /// Hits that failed terminally
    pub failed: u64,
    /// Total hits enumerated
    pub total: u64,
}

/// Event emitted during a pipeline run
///
/// Consumers subscribe via [`crate::SearchDownloader::subscribe`]; no polling
/// is required.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A search results page was enumerated
    SearchPage {
        /// Page number (1-based)
        page: u32,
        /// Hits on this page
        hits: usize,
        /// Total hits enumerated so far
        total: u64,
    },

    /// Project metadata was pre-fetched for newly seen projects
    ProjectsCached {
        /// Number of newly resolved projects
        count: usize,
    },

    /// One hit reached a terminal outcome
    FileComplete {
        /// Full namespace path of the owning project
        project_path: String,
        /// Repository-relative file path
        file_path: String,
        /// Terminal status of the hit
        status: OutcomeStatus,
    },

    /// Aggregate progress update
    ///
    /// `total` may still grow while enumeration runs concurrently with
    /// downloads.
    Progress {
        /// Hits with a terminal outcome
        completed: u64,
        /// Hits enumerated so far
        total: u64,
        /// Successful downloads so far
        success: u64,
        /// Skipped hits so far
        skipped: u64,
        /// Failed hits so far
        failed: u64,
    },

    /// The run finished (successfully, aborted, or cancelled)
    Finished {
        /// Final counters
        summary: Summary,
    },
}
