//! Per-hit download worker
//!
//! Each worker task processes exactly one search hit: resolve the owning
//! project through the cache, decide skip-vs-download via the resume ledger,
//! fetch the raw content under the retry policy, and write it atomically to
//! the sanitized local path. The terminal outcome is forwarded to the
//! progress accountant before the worker's permit is released, so no outcome
//! is lost even if the run is interrupted between hits.

use crate::api::CodeHostApi;
use crate::config::Config;
use crate::error::ErrorKind;
use crate::ledger::ResumeLedger;
use crate::progress::{HitReport, ProgressAccountant};
use crate::project_cache::ProjectCache;
use crate::retry;
use crate::types::{DownloadOutcome, MetadataRecord, SearchHit, SkipReason};
use crate::utils::sanitize_file_name;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

/// Shared state handed to each spawned worker task
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) config: Arc<Config>,
    pub(crate) api: Arc<dyn CodeHostApi>,
    pub(crate) cache: Arc<ProjectCache>,
    pub(crate) ledger: Arc<ResumeLedger>,
    pub(crate) progress: Arc<ProgressAccountant>,
    pub(crate) cancel: CancellationToken,
}

/// Process one hit to a terminal outcome and record it
///
/// The permit is held for the whole lifetime of the task, which is what
/// bounds the worker pool.
pub(crate) async fn process_hit(
    ctx: WorkerContext,
    hit: SearchHit,
    _permit: OwnedSemaphorePermit,
) {
    let report = tokio::select! {
        _ = ctx.cancel.cancelled() => None,
        report = evaluate_hit(&ctx, hit) => Some(report),
    };
    if let Some(report) = report {
        ctx.progress.record(report).await;
    }
}

/// Walk one hit through skip check, project resolution, fetch and write
async fn evaluate_hit(ctx: &WorkerContext, hit: SearchHit) -> HitReport {
    // Resolve the owning project; pre-warming makes this a cache read for
    // every hit after the first of its project
    let project = match ctx.cache.resolve(hit.project_id).await {
        Ok(project) => project,
        Err(e) => {
            return HitReport {
                project_path: hit
                    .project_path
                    .clone()
                    .unwrap_or_else(|| format!("project-{}", hit.project_id)),
                file_path: hit.file_path,
                attempts: 0,
                outcome: DownloadOutcome::Failed {
                    kind: ErrorKind::ProjectResolutionError,
                    attempts: 0,
                    error: e.to_string(),
                },
                metadata: None,
            };
        }
    };

    let local_name = sanitize_file_name(&project.path, &hit.file_path);
    let local_path = ctx.config.output_dir.join(&local_name);

    // Skip decision comes before any per-hit network call
    if ctx
        .ledger
        .is_resumed(&project.path, &hit.file_path, &local_path)
        .await
    {
        return HitReport {
            project_path: project.path.clone(),
            file_path: hit.file_path,
            attempts: 0,
            outcome: DownloadOutcome::Skipped {
                reason: SkipReason::AlreadyDownloaded,
            },
            metadata: None,
        };
    }

    let ref_name = hit
        .ref_name
        .clone()
        .or_else(|| project.default_branch.clone())
        .unwrap_or_else(|| "HEAD".to_string());

    let (result, attempts) = retry::execute(&ctx.config.retry, || {
        ctx.api.raw_file(hit.project_id, &hit.file_path, &ref_name)
    })
    .await;

    let outcome = match result {
        Ok(content) => match write_atomic(&local_path, &content).await {
            Ok(()) => {
                ctx.ledger.record(&project.path, &hit.file_path).await;
                DownloadOutcome::Success {
                    local_path: local_path.clone(),
                    bytes: content.len() as u64,
                }
            }
            Err(e) => DownloadOutcome::Failed {
                kind: ErrorKind::LocalWriteError,
                attempts,
                error: e.to_string(),
            },
        },
        Err(e) => DownloadOutcome::Failed {
            kind: e.kind(),
            attempts,
            error: e.to_string(),
        },
    };

    let metadata = match &outcome {
        DownloadOutcome::Success { .. } => Some(MetadataRecord {
            local_filename: local_name,
            project_path: project.path.clone(),
            file_path: hit.file_path.clone(),
            ref_name,
        }),
        _ => None,
    };

    HitReport {
        project_path: project.path.clone(),
        file_path: hit.file_path,
        attempts,
        outcome,
        metadata,
    }
}

/// Write content to a temporary sibling and rename it into place
///
/// The rename keeps a crash from leaving a half-written file at the final
/// path; re-runs overwrite idempotently.
async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = std::path::PathBuf::from(tmp);
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await
}
