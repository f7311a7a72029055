//! Progress and outcome accounting
//!
//! Aggregates per-hit outcomes into live counters and the metadata export,
//! and appends one structured line per terminal outcome to the attempt log.
//! Counters, the growing metadata collection and the log file are the only
//! state mutated by multiple workers; each sits behind a single mutation
//! point.

use crate::config::ATTEMPT_LOG_FILE_NAME;
use crate::error::Result;
use crate::types::{DownloadOutcome, Event, MetadataRecord, OutcomeStatus, Summary};
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, broadcast};

/// Terminal report for one hit, produced by a download worker
#[derive(Clone, Debug)]
pub struct HitReport {
    /// Full namespace path of the owning project, or the `project-<id>`
    /// placeholder when resolution failed
    pub project_path: String,
    /// Repository-relative file path
    pub file_path: String,
    /// Number of attempts the hit's own network activity took
    pub attempts: u32,
    /// Terminal outcome
    pub outcome: DownloadOutcome,
    /// Metadata entry; present exactly when the outcome is a success
    pub metadata: Option<MetadataRecord>,
}

/// Append-only structured log of every terminal outcome
///
/// One JSON line per hit: timestamp, hit identity, status, attempts, and the
/// error detail for failures. Failures stay individually enumerable after the
/// run; nothing is silently dropped.
pub struct AttemptLog {
    file: Mutex<tokio::fs::File>,
}

#[derive(Serialize)]
struct AttemptEntry<'a> {
    timestamp: String,
    project_path: &'a str,
    file_path: &'a str,
    status: OutcomeStatus,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl AttemptLog {
    /// Open (or create) the attempt log inside an output directory
    pub async fn open(output_dir: &Path) -> Result<Self> {
        let path = output_dir.join(ATTEMPT_LOG_FILE_NAME);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one line for a terminal outcome
    pub async fn append(&self, report: &HitReport) -> Result<()> {
        let error = match &report.outcome {
            DownloadOutcome::Failed { error, kind, .. } => Some(format!("{}: {}", kind, error)),
            _ => None,
        };
        let entry = AttemptEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            project_path: &report.project_path,
            file_path: &report.file_path,
            status: report.outcome.status(),
            attempts: report.attempts,
            local_filename: report.metadata.as_ref().map(|m| m.local_filename.as_str()),
            error: error.as_deref(),
        };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

struct Counters {
    success: u64,
    skipped: u64,
    failed: u64,
    total: u64,
    metadata: Vec<MetadataRecord>,
}

/// Aggregates outcomes, owns the metadata collection, and emits progress
/// events
pub struct ProgressAccountant {
    inner: Mutex<Counters>,
    event_tx: broadcast::Sender<Event>,
    log: AttemptLog,
}

impl ProgressAccountant {
    /// Create an accountant that emits on the given event channel and appends
    /// to the given attempt log
    pub fn new(event_tx: broadcast::Sender<Event>, log: AttemptLog) -> Self {
        Self {
            inner: Mutex::new(Counters {
                success: 0,
                skipped: 0,
                failed: 0,
                total: 0,
                metadata: Vec::new(),
            }),
            event_tx,
            log,
        }
    }

    /// Grow the enumerated-hit total as pages arrive
    ///
    /// Downloads run while enumeration continues, so the progress denominator
    /// grows during the run.
    pub async fn add_enumerated(&self, count: usize) {
        let mut inner = self.inner.lock().await;
        inner.total += count as u64;
        let event = progress_event(&inner);
        drop(inner);
        let _ = self.event_tx.send(event);
    }

    /// Record one terminal outcome
    ///
    /// Appends to the attempt log, bumps exactly one counter, collects the
    /// metadata record for successes, and emits `FileComplete` plus an
    /// aggregate `Progress` event.
    pub async fn record(&self, report: HitReport) {
        if let Err(e) = self.log.append(&report).await {
            tracing::warn!(error = %e, "failed to append to attempt log");
        }

        match &report.outcome {
            DownloadOutcome::Success { local_path, bytes } => {
                tracing::info!(
                    project_path = %report.project_path,
                    file_path = %report.file_path,
                    bytes,
                    attempts = report.attempts,
                    local_path = %local_path.display(),
                    "downloaded file"
                );
            }
            DownloadOutcome::Skipped { .. } => {
                tracing::debug!(
                    project_path = %report.project_path,
                    file_path = %report.file_path,
                    "skipped already-downloaded file"
                );
            }
            DownloadOutcome::Failed { kind, error, attempts } => {
                tracing::error!(
                    project_path = %report.project_path,
                    file_path = %report.file_path,
                    kind = %kind,
                    attempts,
                    error = %error,
                    "download failed"
                );
            }
        }

        let status = report.outcome.status();
        let (file_event, progress) = {
            let mut inner = self.inner.lock().await;
            match status {
                OutcomeStatus::Success => inner.success += 1,
                OutcomeStatus::Skipped => inner.skipped += 1,
                OutcomeStatus::Failed => inner.failed += 1,
            }
            if let Some(metadata) = report.metadata {
                inner.metadata.push(metadata);
            }
            (
                Event::FileComplete {
                    project_path: report.project_path,
                    file_path: report.file_path,
                    status,
                },
                progress_event(&inner),
            )
        };

        let _ = self.event_tx.send(file_event);
        let _ = self.event_tx.send(progress);
    }

    /// Current counter snapshot
    pub async fn summary(&self) -> Summary {
        let inner = self.inner.lock().await;
        Summary {
            success: inner.success,
            skipped: inner.skipped,
            failed: inner.failed,
            total: inner.total,
        }
    }

    /// Snapshot of the metadata collection, in append order
    pub async fn metadata(&self) -> Vec<MetadataRecord> {
        self.inner.lock().await.metadata.clone()
    }
}

fn progress_event(inner: &Counters) -> Event {
    Event::Progress {
        completed: inner.success + inner.skipped + inner.failed,
        total: inner.total,
        success: inner.success,
        skipped: inner.skipped,
        failed: inner.failed,
    }
}
