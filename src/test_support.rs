//! In-memory [`CodeHostApi`] fake shared by unit and pipeline tests
//!
//! Supports fault injection (malformed pages, failing projects, transient
//! rate-limit failures per file) and counts every call so tests can assert
//! on coalescing, resume and retry behavior.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::api::CodeHostApi;
use crate::error::{Error, Result};
use crate::types::{ProjectId, ProjectRecord, SearchHit};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Fake code-host backend with per-call counters and fault injection
#[derive(Default)]
pub(crate) struct MockApi {
    /// Search pages served in order; pages beyond the vec are empty
    pub pages: Vec<Vec<SearchHit>>,
    /// Serve a malformed-payload error for this 1-based page
    pub malformed_page: Option<u32>,
    /// Known projects by id
    pub projects: HashMap<ProjectId, ProjectRecord>,
    /// Projects whose lookup always fails
    pub failing_projects: HashSet<ProjectId>,
    /// Artificial latency per project lookup
    pub project_delay: Option<Duration>,
    /// Raw file contents by (project, file path)
    pub files: HashMap<(ProjectId, String), Vec<u8>>,
    /// Remaining rate-limit failures to inject per (project, file path)
    pub transient_raw_failures: Mutex<HashMap<(ProjectId, String), u32>>,
    pub search_calls: AtomicU32,
    pub project_calls: AtomicU32,
    pub raw_calls: AtomicU32,
    pub inflight_projects: AtomicU32,
    pub max_inflight_projects: AtomicU32,
}

impl MockApi {
    pub fn hit(project: i64, file_path: &str) -> SearchHit {
        SearchHit {
            project_id: ProjectId::new(project),
            project_path: None,
            file_path: file_path.to_string(),
            ref_name: Some("main".to_string()),
        }
    }

    pub fn record(project: i64, path: &str) -> ProjectRecord {
        ProjectRecord {
            id: ProjectId::new(project),
            path: path.to_string(),
            default_branch: Some("main".to_string()),
        }
    }

    pub fn with_project(mut self, project: i64, path: &str) -> Self {
        self.projects
            .insert(ProjectId::new(project), Self::record(project, path));
        self
    }

    pub fn with_file(mut self, project: i64, file_path: &str, content: &[u8]) -> Self {
        self.files
            .insert((ProjectId::new(project), file_path.to_string()), content.to_vec());
        self
    }

    pub fn with_transient_raw_failures(self, project: i64, file_path: &str, count: u32) -> Self {
        self.transient_raw_failures
            .try_lock()
            .unwrap()
            .insert((ProjectId::new(project), file_path.to_string()), count);
        self
    }
}

#[async_trait]
impl CodeHostApi for MockApi {
    async fn search_page(
        &self,
        _query: &str,
        _group: Option<&str>,
        page: u32,
        _per_page: u32,
    ) -> Result<Vec<SearchHit>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.malformed_page == Some(page) {
            return Err(Error::MalformedResponse(format!(
                "search page {}: injected parse failure",
                page
            )));
        }
        Ok(self
            .pages
            .get((page - 1) as usize)
            .cloned()
            .unwrap_or_default())
    }

    async fn project(&self, id: ProjectId) -> Result<ProjectRecord> {
        self.project_calls.fetch_add(1, Ordering::SeqCst);

        let inflight = self.inflight_projects.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight_projects
            .fetch_max(inflight, Ordering::SeqCst);
        if let Some(delay) = self.project_delay {
            tokio::time::sleep(delay).await;
        }
        self.inflight_projects.fetch_sub(1, Ordering::SeqCst);

        if self.failing_projects.contains(&id) {
            return Err(Error::NotFound(format!("project {}", id)));
        }
        self.projects
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("project {}", id)))
    }

    async fn raw_file(
        &self,
        project: ProjectId,
        file_path: &str,
        _ref_name: &str,
    ) -> Result<Vec<u8>> {
        self.raw_calls.fetch_add(1, Ordering::SeqCst);

        let key = (project, file_path.to_string());
        {
            let mut failures = self.transient_raw_failures.lock().await;
            if let Some(remaining) = failures.get_mut(&key)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(Error::RateLimited { retry_after: None });
            }
        }

        self.files
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{}/{}", project, file_path)))
    }
}
