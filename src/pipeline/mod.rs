//! Core pipeline orchestration
//!
//! Wires the enumerator, the project cache, the resume ledger, the worker
//! pool and the progress accountant into one run:
//!
//! 1. An enumeration task streams search result pages into a bounded channel.
//! 2. Per page, project metadata for newly seen projects is pre-warmed with
//!    its own concurrency bound, then the page's hits are handed to workers.
//! 3. A semaphore-bounded worker pool downloads files, skipping hits the
//!    ledger already covers; each worker forwards its outcome to the
//!    accountant before releasing its permit.
//! 4. At the end `metadata.json` is written and a summary is returned —
//!    also on abort and cancellation, so a partial run stays resumable.

mod worker;


use crate::api::CodeHostApi;
use crate::config::{Config, METADATA_FILE_NAME};
use crate::enumerator::ResultEnumerator;
use crate::error::{Error, Result};
use crate::ledger::ResumeLedger;
use crate::progress::{AttemptLog, ProgressAccountant};
use crate::project_cache::ProjectCache;
use crate::types::{Event, ProjectId, Summary};
use futures::TryStreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use worker::WorkerContext;

/// Buffered event capacity; subscribers that lag simply miss events
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Search-and-download pipeline instance (cloneable — all fields are
/// Arc-wrapped)
#[derive(Clone)]
pub struct SearchDownloader {
    config: Arc<Config>,
    api: Arc<dyn CodeHostApi>,
    cache: Arc<ProjectCache>,
    ledger: Arc<ResumeLedger>,
    progress: Arc<ProgressAccountant>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SearchDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchDownloader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SearchDownloader {
    /// Create a new pipeline instance
    ///
    /// Validates the configuration, creates the output directory, opens the
    /// attempt log, and seeds the resume ledger from any previous run in the
    /// same output directory.
    pub async fn new(config: Config, api: Arc<dyn CodeHostApi>) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "failed to create output directory '{}': {}",
                        config.output_dir.display(),
                        e
                    ),
                ))
            })?;

        let ledger = Arc::new(ResumeLedger::load(&config.output_dir).await?);
        let log = AttemptLog::open(&config.output_dir).await?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let progress = Arc::new(ProgressAccountant::new(event_tx.clone(), log));
        let cache = Arc::new(ProjectCache::new(api.clone(), config.retry.clone()));

        Ok(Self {
            config: Arc::new(config),
            api,
            cache,
            ledger,
            progress,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that cancels the run when triggered
    ///
    /// Cancellation takes effect at the next suspension point. Files already
    /// written and the partial metadata export stay valid for resume.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current counter snapshot; useful after an aborted run
    pub async fn summary(&self) -> Summary {
        self.progress.summary().await
    }

    /// Run the pipeline to completion
    ///
    /// Returns the final summary. A malformed search payload aborts the run:
    /// in-flight downloads drain, partial results are persisted, and the
    /// error is returned.
    pub async fn run(&self) -> Result<Summary> {
        tracing::info!(
            query = %self.config.query,
            hostname = %self.config.hostname,
            group = self.config.group.as_deref(),
            workers = self.config.workers,
            output_dir = %self.config.output_dir.display(),
            "starting search and download run"
        );

        let (hit_tx, mut hit_rx) = mpsc::channel(self.config.page_size.max(1) as usize);
        let enumeration = self.spawn_enumeration(hit_tx);

        // Bounded worker pool: one permit per worker slot, one task per hit
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut workers = JoinSet::new();
        let ctx = WorkerContext {
            config: self.config.clone(),
            api: self.api.clone(),
            cache: self.cache.clone(),
            ledger: self.ledger.clone(),
            progress: self.progress.clone(),
            cancel: self.cancel.clone(),
        };

        loop {
            let hit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                hit = hit_rx.recv() => match hit {
                    Some(hit) => hit,
                    None => break,
                },
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let ctx = ctx.clone();
            workers.spawn(async move {
                worker::process_hit(ctx, hit, permit).await;
            });
        }

        // Let in-flight downloads reach a terminal outcome before persisting
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "download worker panicked");
            }
        }

        let enumeration_result = match enumeration.await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled),
        };

        self.export_metadata().await?;

        let summary = self.progress.summary().await;
        let _ = self.event_tx.send(Event::Finished { summary });
        tracing::info!(
            success = summary.success,
            skipped = summary.skipped,
            failed = summary.failed,
            total = summary.total,
            "run finished"
        );

        match enumeration_result {
            // A user-requested cancel is a clean partial run, not a failure
            Err(Error::Cancelled) => {}
            other => other?,
        }
        Ok(summary)
    }

    /// Spawn the enumeration task: stream pages, pre-warm the cache for newly
    /// seen projects, then feed hits to the worker pool
    fn spawn_enumeration(
        &self,
        hit_tx: mpsc::Sender<crate::types::SearchHit>,
    ) -> tokio::task::JoinHandle<Result<()>> {
        let enumerator = ResultEnumerator::new(
            self.api.clone(),
            self.config.query.clone(),
            self.config.group.clone(),
            self.config.page_size,
            self.config.retry.clone(),
        );
        let cache = self.cache.clone();
        let progress = self.progress.clone();
        let event_tx = self.event_tx.clone();
        let cancel = self.cancel.clone();
        let prefetch_concurrency = self.config.prefetch_concurrency;

        tokio::spawn(async move {
            let mut pages = Box::pin(enumerator.pages());
            let mut seen = HashSet::new();
            let mut page_no = 0u32;
            let mut total = 0u64;

            loop {
                let page = tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    page = pages.try_next() => page?,
                };
                let Some(page) = page else { break };

                page_no += 1;
                total += page.len() as u64;
                progress.add_enumerated(page.len()).await;
                let _ = event_tx.send(Event::SearchPage {
                    page: page_no,
                    hits: page.len(),
                    total,
                });

                // Front-load project lookups for this page before its hits
                // reach the workers, so downloads start with a warm cache
                let fresh: Vec<ProjectId> = page
                    .iter()
                    .map(|hit| hit.project_id)
                    .filter(|id| seen.insert(*id))
                    .collect();
                if !fresh.is_empty() {
                    let warmed = cache.prewarm(fresh, prefetch_concurrency).await;
                    let _ = event_tx.send(Event::ProjectsCached { count: warmed });
                }

                for hit in page {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        sent = hit_tx.send(hit) => {
                            if sent.is_err() {
                                // Worker side shut down; stop enumerating
                                return Ok(());
                            }
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Write the metadata export for all successes so far
    async fn export_metadata(&self) -> Result<()> {
        let metadata = self.progress.metadata().await;
        let json = serde_json::to_vec_pretty(&metadata)?;
        let path = self.config.output_dir.join(METADATA_FILE_NAME);
        tokio::fs::write(&path, json).await?;
        tracing::info!(count = metadata.len(), path = %path.display(), "wrote metadata export");
        Ok(())
    }
}
