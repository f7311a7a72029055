//! Coalescing project metadata cache
//!
//! Many hits usually belong to the same handful of projects, so project
//! lookups are deduplicated: the first resolve for an id issues the network
//! call and every concurrent or later caller observes that call's stored
//! result, success or failure. Failures are cached too — a project that
//! cannot be resolved fails each of its hits without a second lookup.

use crate::api::CodeHostApi;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry;
use crate::types::{ProjectId, ProjectRecord};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Outcome of one project lookup, stored once and shared by all callers
type SlotValue = std::result::Result<Arc<ProjectRecord>, Arc<str>>;

/// One lookup slot per project id
///
/// `OnceCell` guarantees the initializer runs exactly once; concurrent
/// resolvers for the same id wait on it instead of issuing their own call.
type Slot = Arc<OnceCell<SlotValue>>;

/// Deduplicating, pre-warmable cache of project identity metadata
pub struct ProjectCache {
    api: Arc<dyn CodeHostApi>,
    retry: RetryConfig,
    slots: Mutex<HashMap<ProjectId, Slot>>,
}

impl ProjectCache {
    /// Create an empty cache backed by the given API
    pub fn new(api: Arc<dyn CodeHostApi>, retry: RetryConfig) -> Self {
        Self {
            api,
            retry,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a project id to its shared metadata record
    ///
    /// At most one network lookup is ever made per id, no matter how many
    /// callers race on it. A cached failure is returned as
    /// [`Error::ProjectResolution`] for every caller.
    pub async fn resolve(&self, id: ProjectId) -> Result<Arc<ProjectRecord>> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(id).or_default().clone()
        };

        let value = slot
            .get_or_init(|| async {
                let (result, attempts) =
                    retry::execute(&self.retry, || self.api.project(id)).await;
                match result {
                    Ok(record) => {
                        tracing::debug!(project_id = %id, path = %record.path, "resolved project");
                        Ok(Arc::new(record))
                    }
                    Err(e) => {
                        tracing::warn!(project_id = %id, error = %e, attempts, "project resolution failed");
                        Err(Arc::from(e.to_string().as_str()))
                    }
                }
            })
            .await;

        match value {
            Ok(record) => Ok(record.clone()),
            Err(message) => Err(Error::ProjectResolution {
                project_id: id,
                message: message.to_string(),
            }),
        }
    }

    /// Pre-warm the cache for a set of project ids
    ///
    /// Resolves the distinct id set with bounded concurrency, independent of
    /// the download worker count, to front-load lookup latency before file
    /// downloads begin. Individual failures are cached and do not interrupt
    /// the warm-up of other projects.
    ///
    /// Returns the number of ids that were not already cached.
    pub async fn prewarm(&self, ids: impl IntoIterator<Item = ProjectId>, concurrency: usize) -> usize {
        let fresh: Vec<ProjectId> = {
            let slots = self.slots.lock().await;
            let mut distinct: Vec<ProjectId> = Vec::new();
            for id in ids {
                if !slots.contains_key(&id) && !distinct.contains(&id) {
                    distinct.push(id);
                }
            }
            distinct
        };

        if fresh.is_empty() {
            return 0;
        }

        let count = fresh.len();
        futures::stream::iter(fresh)
            .for_each_concurrent(concurrency, |id| async move {
                let _ = self.resolve(id).await;
            })
            .await;
        count
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockApi;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 0,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn concurrent_resolves_coalesce_to_one_lookup() {
        let api = Arc::new(
            MockApi {
                project_delay: Some(Duration::from_millis(30)),
                ..MockApi::default()
            }
            .with_project(7, "group/app"),
        );
        let cache = Arc::new(ProjectCache::new(api.clone(), fast_retry()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(
                async move { cache.resolve(ProjectId::new(7)).await },
            ));
        }

        let mut records = Vec::new();
        for handle in handles {
            records.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(
            api.project_calls.load(Ordering::SeqCst),
            1,
            "eight concurrent resolves must collapse to one network call"
        );
        for pair in records.windows(2) {
            assert!(
                Arc::ptr_eq(&pair[0], &pair[1]),
                "all callers share one record"
            );
        }
    }

    #[tokio::test]
    async fn failure_is_cached_and_shared() {
        let api = Arc::new(MockApi {
            failing_projects: [ProjectId::new(3)].into_iter().collect(),
            ..MockApi::default()
        });
        let cache = ProjectCache::new(api.clone(), fast_retry());

        let first = cache.resolve(ProjectId::new(3)).await.unwrap_err();
        let second = cache.resolve(ProjectId::new(3)).await.unwrap_err();

        assert_eq!(
            api.project_calls.load(Ordering::SeqCst),
            1,
            "a cached failure must not trigger a second lookup"
        );
        assert!(matches!(first, Error::ProjectResolution { .. }));
        assert!(matches!(second, Error::ProjectResolution { .. }));
    }

    #[tokio::test]
    async fn distinct_ids_resolve_independently() {
        let api = Arc::new(
            MockApi {
                failing_projects: [ProjectId::new(2)].into_iter().collect(),
                ..MockApi::default()
            }
            .with_project(1, "group/one"),
        );
        let cache = ProjectCache::new(api.clone(), fast_retry());

        let ok = cache.resolve(ProjectId::new(1)).await.unwrap();
        let err = cache.resolve(ProjectId::new(2)).await;

        assert_eq!(ok.path, "group/one");
        assert!(err.is_err(), "one project's failure must not affect others");
    }

    #[tokio::test]
    async fn prewarm_respects_concurrency_bound() {
        let mut api = MockApi {
            project_delay: Some(Duration::from_millis(20)),
            ..MockApi::default()
        };
        for id in 1..=10 {
            api = api.with_project(id, &format!("group/p{}", id));
        }
        let api = Arc::new(api);
        let cache = ProjectCache::new(api.clone(), fast_retry());

        let ids: Vec<ProjectId> = (1..=10).map(ProjectId::new).collect();
        let warmed = cache.prewarm(ids, 3).await;

        assert_eq!(warmed, 10);
        assert_eq!(api.project_calls.load(Ordering::SeqCst), 10);
        assert!(
            api.max_inflight_projects.load(Ordering::SeqCst) <= 3,
            "at most 3 lookups may be in flight, saw {}",
            api.max_inflight_projects.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn prewarm_skips_already_cached_ids_and_dedupes() {
        let api = Arc::new(
            MockApi::default()
                .with_project(1, "group/one")
                .with_project(2, "group/two"),
        );
        let cache = ProjectCache::new(api.clone(), fast_retry());

        cache.resolve(ProjectId::new(1)).await.unwrap();

        let ids = vec![
            ProjectId::new(1),
            ProjectId::new(2),
            ProjectId::new(2),
        ];
        let warmed = cache.prewarm(ids, 4).await;

        assert_eq!(warmed, 1, "only project 2 is new");
        assert_eq!(api.project_calls.load(Ordering::SeqCst), 2);
    }
}
