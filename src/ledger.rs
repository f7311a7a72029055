//! Resume ledger
//!
//! Tracks which (project path, file path) pairs have already been
//! materialized into the output directory, either by a prior run (seeded from
//! that run's `metadata.json` and the files on disk) or by the current one.
//! The ledger is consulted before any network call is issued for a hit, which
//! is what makes re-runs idempotent.

use crate::config::METADATA_FILE_NAME;
use crate::error::Result;
use crate::types::MetadataRecord;
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::Mutex;

/// Set of already-materialized (project path, file path) pairs
pub struct ResumeLedger {
    entries: Mutex<HashSet<(String, String)>>,
}

impl ResumeLedger {
    /// Load the ledger for an output directory
    ///
    /// Seeds from a prior run's `metadata.json` when present. A missing file
    /// means a fresh run; an unreadable one is logged and treated as empty so
    /// the worst case is re-downloading, never data loss.
    pub async fn load(output_dir: &Path) -> Result<Self> {
        let mut entries = HashSet::new();

        let metadata_path = output_dir.join(METADATA_FILE_NAME);
        match tokio::fs::read(&metadata_path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<MetadataRecord>>(&bytes) {
                Ok(records) => {
                    for record in records {
                        entries.insert((record.project_path, record.file_path));
                    }
                    tracing::info!(
                        count = entries.len(),
                        "seeded resume ledger from previous metadata"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unreadable metadata from previous run");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    /// Create an empty ledger (no prior run)
    pub fn empty() -> Self {
        Self {
            entries: Mutex::new(HashSet::new()),
        }
    }

    /// Decide whether a hit is already materialized
    ///
    /// True when the pair is ledgered or the target file already exists on
    /// disk; an on-disk find is folded into the ledger so later duplicates
    /// take the fast path.
    pub async fn is_resumed(
        &self,
        project_path: &str,
        file_path: &str,
        local_path: &Path,
    ) -> bool {
        let key = (project_path.to_string(), file_path.to_string());
        {
            let entries = self.entries.lock().await;
            if entries.contains(&key) {
                return true;
            }
        }

        if tokio::fs::try_exists(local_path).await.unwrap_or(false) {
            self.entries.lock().await.insert(key);
            return true;
        }
        false
    }

    /// Record a successfully materialized pair
    pub async fn record(&self, project_path: &str, file_path: &str) {
        self.entries
            .lock()
            .await
            .insert((project_path.to_string(), file_path.to_string()));
    }

    /// Number of ledgered pairs
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the ledger has no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fresh_directory_loads_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = ResumeLedger::load(dir.path()).await.unwrap();
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn seeds_from_previous_metadata() {
        let dir = TempDir::new().unwrap();
        let records = vec![
            MetadataRecord {
                local_filename: "group__app__src__a.rs".to_string(),
                project_path: "group/app".to_string(),
                file_path: "src/a.rs".to_string(),
                ref_name: "main".to_string(),
            },
            MetadataRecord {
                local_filename: "group__app__src__b.rs".to_string(),
                project_path: "group/app".to_string(),
                file_path: "src/b.rs".to_string(),
                ref_name: "main".to_string(),
            },
        ];
        let json = serde_json::to_vec(&records).unwrap();
        std::fs::write(dir.path().join(METADATA_FILE_NAME), json).unwrap();

        let ledger = ResumeLedger::load(dir.path()).await.unwrap();
        assert_eq!(ledger.len().await, 2);

        let missing = dir.path().join("does-not-exist");
        assert!(ledger.is_resumed("group/app", "src/a.rs", &missing).await);
        assert!(!ledger.is_resumed("group/app", "src/new.rs", &missing).await);
    }

    #[tokio::test]
    async fn corrupt_metadata_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE_NAME), b"not json").unwrap();

        let ledger = ResumeLedger::load(dir.path()).await.unwrap();
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn existing_local_file_counts_as_resumed() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("group__app__Makefile");
        std::fs::write(&local, b"all:").unwrap();

        let ledger = ResumeLedger::empty();
        assert!(ledger.is_resumed("group/app", "Makefile", &local).await);
        // The on-disk find is now ledgered
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn record_makes_pair_resumed() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");

        let ledger = ResumeLedger::empty();
        assert!(!ledger.is_resumed("g/p", "x.rs", &missing).await);

        ledger.record("g/p", "x.rs").await;
        assert!(ledger.is_resumed("g/p", "x.rs", &missing).await);
    }
}
