//! Ingestion configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::archive::{DecodePolicy, DEFAULT_MAX_ENTRY_BYTES};
use crate::fetch::DEFAULT_FETCH_TIMEOUT_SECS;
use crate::monitor::DEFAULT_MAX_CONCURRENT;
use crate::pipeline::StagingDirs;
use crate::store::StoreBackend;

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default root for the store, staging areas and inbox.
pub const DEFAULT_DATA_DIR: &str = "./leakwatch-data";

/// Default spool polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Upper bound on concurrent attachments.
pub const MAX_CONCURRENT_LIMIT: usize = 256;

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    /// Explicit store file; derived from `data_dir` and the backend when unset
    pub store_path: Option<PathBuf>,
    pub store_backend: StoreBackend,
    /// Spool directory; `<data_dir>/inbox` when unset
    pub inbox_dir: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub max_concurrent: usize,
    pub max_entry_bytes: u64,
    pub decode_policy: DecodePolicy,
    pub fetch_url: Option<String>,
    #[serde(skip_serializing)]
    pub fetch_token: Option<String>,
    pub fetch_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            store_path: None,
            store_backend: StoreBackend::default(),
            inbox_dir: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            decode_policy: DecodePolicy::default(),
            fetch_url: None,
            fetch_token: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl IngestConfig {
    /// Load configuration from `.env`, the environment and defaults.
    ///
    /// Not validated: apply command-line overrides first, then call
    /// [`IngestConfig::validate`].
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let store_backend = match var("LEAKWATCH_STORE_BACKEND") {
            Some(value) => value.parse()?,
            None => StoreBackend::default(),
        };
        let decode_policy = match var("LEAKWATCH_DECODE_POLICY") {
            Some(value) => value.parse()?,
            None => DecodePolicy::default(),
        };

        let config = IngestConfig {
            data_dir: var("LEAKWATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            store_path: var("LEAKWATCH_STORE_PATH").map(PathBuf::from),
            store_backend,
            inbox_dir: var("LEAKWATCH_INBOX_DIR").map(PathBuf::from),
            poll_interval_secs: var("LEAKWATCH_POLL_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            max_concurrent: var("LEAKWATCH_MAX_CONCURRENT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONCURRENT),
            max_entry_bytes: var("LEAKWATCH_MAX_ENTRY_BYTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_ENTRY_BYTES),
            decode_policy,
            fetch_url: var("LEAKWATCH_FETCH_URL"),
            fetch_token: var("LEAKWATCH_FETCH_TOKEN"),
            fetch_timeout_secs: var("LEAKWATCH_FETCH_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("Data directory cannot be empty");
        }

        if self.max_concurrent == 0 || self.max_concurrent > MAX_CONCURRENT_LIMIT {
            anyhow::bail!(
                "max_concurrent must be between 1 and {} (got {})",
                MAX_CONCURRENT_LIMIT,
                self.max_concurrent
            );
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.max_entry_bytes == 0 {
            anyhow::bail!("max_entry_bytes must be greater than 0");
        }

        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("Fetch timeout must be greater than 0");
        }

        if self.fetch_token.is_some() && self.fetch_url.is_none() {
            tracing::warn!(
                "LEAKWATCH_FETCH_TOKEN is set but LEAKWATCH_FETCH_URL is not; token unused"
            );
        }

        Ok(())
    }

    /// Resolved store file
    pub fn store_path(&self) -> PathBuf {
        match &self.store_path {
            Some(path) => path.clone(),
            None => match self.store_backend {
                StoreBackend::Sqlite => self.data_dir.join("records.sqlite"),
                StoreBackend::Csv => self.data_dir.join("records.csv"),
            },
        }
    }

    /// Resolved spool directory
    pub fn inbox_dir(&self) -> PathBuf {
        self.inbox_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("inbox"))
    }

    pub fn staging(&self) -> StagingDirs {
        StagingDirs::under(&self.data_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
