//! Configuration types for gitlab-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::utils::sanitize_component;

/// Name of the metadata export file inside the output directory
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Name of the append-only attempt log inside the output directory
pub const ATTEMPT_LOG_FILE_NAME: &str = "download.log";

/// Inclusive bounds for the download worker count
pub const WORKER_RANGE: std::ops::RangeInclusive<usize> = 1..=50;

/// Main configuration for a search-and-download run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// GitLab hostname to search (e.g. "gitlab.example.com")
    pub hostname: String,

    /// Search query (blob scope)
    pub query: String,

    /// Optional group path to scope the search to
    #[serde(default)]
    pub group: Option<String>,

    /// Personal access token; auth failures are fatal and never retried
    #[serde(default)]
    pub token: Option<String>,

    /// Output directory for downloaded files, metadata.json and download.log
    pub output_dir: PathBuf,

    /// Number of parallel download workers (default: 10, valid: 1-50)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Search page size (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Concurrency limit for project metadata pre-fetching, independent of
    /// the download worker count (default: 10)
    #[serde(default = "default_prefetch_concurrency")]
    pub prefetch_concurrency: usize,

    /// Retry behavior for rate-limited and transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Create a config with defaults for a query against a hostname
    ///
    /// The output directory defaults to a timestamped directory under the
    /// system temp dir, derived from the sanitized query so repeated searches
    /// don't collide.
    pub fn new(hostname: impl Into<String>, query: impl Into<String>) -> Self {
        let query = query.into();
        let output_dir = Self::default_output_dir(&query);
        Self {
            hostname: hostname.into(),
            query,
            group: None,
            token: None,
            output_dir,
            workers: default_workers(),
            page_size: default_page_size(),
            prefetch_concurrency: default_prefetch_concurrency(),
            retry: RetryConfig::default(),
        }
    }

    /// Default output directory for a query: `<tmp>/gitlab-search-<query>-<timestamp>`
    pub fn default_output_dir(query: &str) -> PathBuf {
        let sanitized = sanitize_component(query).to_lowercase();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        std::env::temp_dir().join(format!("gitlab-search-{}-{}", sanitized, timestamp))
    }

    /// Validate the configuration
    ///
    /// Checks the worker count range and that required fields are non-empty.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.hostname.is_empty() {
            return Err(crate::error::Error::Config {
                message: "hostname must not be empty".to_string(),
                key: Some("hostname".to_string()),
            });
        }
        if self.query.is_empty() {
            return Err(crate::error::Error::Config {
                message: "query must not be empty".to_string(),
                key: Some("query".to_string()),
            });
        }
        if !WORKER_RANGE.contains(&self.workers) {
            return Err(crate::error::Error::Config {
                message: format!(
                    "workers must be between {} and {}, got {}",
                    WORKER_RANGE.start(),
                    WORKER_RANGE.end(),
                    self.workers
                ),
                key: Some("workers".to_string()),
            });
        }
        if self.page_size == 0 {
            return Err(crate::error::Error::Config {
                message: "page_size must be at least 1".to_string(),
                key: Some("page_size".to_string()),
            });
        }
        if self.prefetch_concurrency == 0 {
            return Err(crate::error::Error::Config {
                message: "prefetch_concurrency must be at least 1".to_string(),
                key: Some("prefetch_concurrency".to_string()),
            });
        }
        Ok(())
    }
}

/// Retry configuration for rate-limited and transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    ///
    /// An operation makes at most `max_retries + 1` attempts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before the first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to computed delays (default: true)
    ///
    /// Server-supplied `Retry-After` hints are honored verbatim, without jitter.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

fn default_workers() -> usize {
    10
}

fn default_page_size() -> u32 {
    100
}

fn default_prefetch_concurrency() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::new("gitlab.example.com", "GeneratedValue");
        assert_eq!(config.workers, 10);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.prefetch_concurrency, 10);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(2));
        config.validate().unwrap();
    }

    #[test]
    fn workers_out_of_range_is_rejected() {
        let mut config = Config::new("gitlab.example.com", "query");
        config.workers = 0;
        assert!(config.validate().is_err());

        config.workers = 51;
        assert!(config.validate().is_err());

        config.workers = 50;
        config.validate().unwrap();

        config.workers = 1;
        config.validate().unwrap();
    }

    #[test]
    fn empty_required_fields_are_rejected() {
        let mut config = Config::new("", "query");
        assert!(config.validate().is_err());

        config.hostname = "gitlab.example.com".to_string();
        config.query = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_output_dir_embeds_sanitized_query() {
        let dir = Config::default_output_dir("class MyService");
        let name = dir.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("gitlab-search-class_myservice-"));
        assert!(!name.contains(' '));
    }

    #[test]
    fn retry_config_roundtrips_through_serde() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 1.5,
            jitter: false,
        };
        let json = serde_json::to_string(&retry).unwrap();
        let parsed: RetryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_retries, 5);
        assert_eq!(parsed.initial_delay, Duration::from_secs(1));
        assert_eq!(parsed.max_delay, Duration::from_secs(30));
        assert!(!parsed.jitter);
    }
}
