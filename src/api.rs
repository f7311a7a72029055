//! Remote code-host API boundary
//!
//! The pipeline talks to the remote host exclusively through the
//! [`CodeHostApi`] trait, which keeps the transport pluggable for tests.
//! [`GitLabApi`] is the production implementation against the GitLab v4 REST
//! API. Authentication is a configured token; a failure to authenticate is
//! surfaced as [`Error::Unauthorized`] and never retried.

use crate::error::{Error, Result};
use crate::types::{ProjectId, ProjectRecord, SearchHit};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Default per-request timeout for API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote operations the pipeline depends on
///
/// All three calls are idempotent, which is what makes wrapping them in
/// retry-with-backoff safe.
#[async_trait]
pub trait CodeHostApi: Send + Sync {
    /// Fetch one page of blob search results
    ///
    /// `group` scopes the search to a group when present. Pages are 1-based;
    /// a page with fewer than `per_page` hits is the last one.
    async fn search_page(
        &self,
        query: &str,
        group: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<SearchHit>>;

    /// Look up identity metadata for a project
    async fn project(&self, id: ProjectId) -> Result<ProjectRecord>;

    /// Fetch raw file content at a ref
    ///
    /// Content is opaque bytes; no text encoding is assumed.
    async fn raw_file(&self, project: ProjectId, file_path: &str, ref_name: &str)
    -> Result<Vec<u8>>;
}

/// GitLab v4 REST API client
pub struct GitLabApi {
    base: Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl GitLabApi {
    /// Create a client for a GitLab hostname (HTTPS, `/api/v4/` base)
    pub fn new(hostname: &str, token: Option<String>) -> Result<Self> {
        let base = Url::parse(&format!("https://{}/api/v4/", hostname)).map_err(|e| {
            Error::Config {
                message: format!("invalid hostname '{}': {}", hostname, e),
                key: Some("hostname".to_string()),
            }
        })?;
        Self::from_base_url(base, token)
    }

    /// Create a client against an explicit base URL
    ///
    /// The base must end with a trailing slash (e.g. `http://host/api/v4/`).
    /// Useful for self-hosted instances on custom schemes and for tests.
    pub fn from_base_url(base: Url, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base,
            token,
            client,
        })
    }

    /// Issue an authenticated GET and map HTTP status codes onto the error model
    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.header("PRIVATE-TOKEN", token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(Error::RateLimited { retry_after });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Unauthorized(format!("{} for {}", status, url)));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(url.to_string()));
        }

        Ok(response.error_for_status()?)
    }

    /// Build the search URL for a page, group-scoped when a group is given
    fn search_url(&self, group: Option<&str>, query: &str, page: u32, per_page: u32) -> Result<Url> {
        // Group-scoped search embeds the URL-encoded group path as a single
        // path segment: /api/v4/groups/<group>/search
        let path = match group {
            Some(group) => format!("groups/{}/search", urlencoding::encode(group)),
            None => "search".to_string(),
        };
        let mut url = self.join(&path)?;
        url.query_pairs_mut()
            .append_pair("scope", "blobs")
            .append_pair("search", query)
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| Error::Config {
            message: format!("invalid API path '{}': {}", path, e),
            key: None,
        })
    }
}

/// Raw blob search hit as returned by the search endpoint
#[derive(Debug, Deserialize)]
struct RawSearchHit {
    project_id: i64,
    /// Repository-relative path; older instances only populate `filename`
    #[serde(default)]
    path: Option<String>,
    filename: String,
    #[serde(rename = "ref", default)]
    ref_name: Option<String>,
}

impl From<RawSearchHit> for SearchHit {
    fn from(raw: RawSearchHit) -> Self {
        let file_path = raw.path.unwrap_or(raw.filename);
        SearchHit {
            project_id: ProjectId::new(raw.project_id),
            project_path: None,
            file_path,
            ref_name: raw.ref_name,
        }
    }
}

/// Project payload from the project-lookup endpoint
#[derive(Debug, Deserialize)]
struct RawProject {
    id: i64,
    path_with_namespace: String,
    #[serde(default)]
    default_branch: Option<String>,
}

#[async_trait]
impl CodeHostApi for GitLabApi {
    async fn search_page(
        &self,
        query: &str,
        group: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<SearchHit>> {
        let url = self.search_url(group, query, page, per_page)?;
        tracing::debug!(%url, page, "fetching search results page");

        let body = self.get(url).await?.text().await?;
        let raw: Vec<RawSearchHit> = serde_json::from_str(&body)
            .map_err(|e| Error::MalformedResponse(format!("search page {}: {}", page, e)))?;
        Ok(raw.into_iter().map(SearchHit::from).collect())
    }

    async fn project(&self, id: ProjectId) -> Result<ProjectRecord> {
        let url = self.join(&format!("projects/{}", id))?;
        tracing::debug!(project_id = %id, "fetching project metadata");

        let body = self.get(url).await?.text().await?;
        let raw: RawProject = serde_json::from_str(&body)
            .map_err(|e| Error::MalformedResponse(format!("project {}: {}", id, e)))?;
        Ok(ProjectRecord {
            id: ProjectId::new(raw.id),
            path: raw.path_with_namespace,
            default_branch: raw.default_branch,
        })
    }

    async fn raw_file(
        &self,
        project: ProjectId,
        file_path: &str,
        ref_name: &str,
    ) -> Result<Vec<u8>> {
        // File paths may contain any character; the path segment must be
        // fully percent-encoded (including '/')
        let encoded = urlencoding::encode(file_path);
        let mut url = self.join(&format!("projects/{}/repository/files/{}/raw", project, encoded))?;
        url.query_pairs_mut().append_pair("ref", ref_name);
        tracing::debug!(project_id = %project, file_path, ref_name, "fetching raw file");

        let bytes = self.get(url).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
