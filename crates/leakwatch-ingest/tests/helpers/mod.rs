//! Test helpers for leakwatch ingest integration tests
//!
//! - Archive builders (zip, tar, tar.gz, tar.bz2, rar)
//! - In-memory fetchers and a read-only table
//! - Pipeline setup over a temporary data directory
#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;

use async_trait::async_trait;
use leakwatch_ingest::archive::ArchiveExtractor;
use leakwatch_ingest::fetch::AttachmentFetcher;
use leakwatch_ingest::parser::RecordParser;
use leakwatch_ingest::pipeline::{IngestionPipeline, StagingDirs};
use leakwatch_ingest::models::StoredRow;
use leakwatch_ingest::store::{DedupKey, DedupStore, StoreBackend, TableBackend, TableSchema};
use leakwatch_ingest::{FetchError, MessageId, StoreError};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Route pipeline logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::new("leakwatch_ingest=debug"))
        .try_init();
}

/// Serves attachments from memory, keyed by `(message_id, filename)`
#[derive(Default)]
pub struct StaticFetcher {
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        self,
        message_id: impl Into<String>,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.insert(message_id, filename, bytes);
        self
    }

    pub fn insert(
        &self,
        message_id: impl Into<String>,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) {
        self.files
            .lock()
            .unwrap()
            .insert((message_id.into(), filename.into()), bytes);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttachmentFetcher for StaticFetcher {
    async fn fetch(&self, message_id: &MessageId, filename: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(&(message_id.to_string(), filename.to_string()))
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("{message_id}/{filename}")))
    }
}

/// Always fails with a transport error
pub struct FailingFetcher;

#[async_trait]
impl AttachmentFetcher for FailingFetcher {
    async fn fetch(&self, _message_id: &MessageId, _filename: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Transport("connection reset by peer".to_string()))
    }
}

/// Signals when a fetch starts, then holds it for `delay` before answering
pub struct SlowFetcher {
    inner: StaticFetcher,
    delay: Duration,
    started: Notify,
}

impl SlowFetcher {
    pub fn new(inner: StaticFetcher, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            started: Notify::new(),
        }
    }

    /// Resolves once some fetch has begun
    pub async fn started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl AttachmentFetcher for SlowFetcher {
    async fn fetch(&self, message_id: &MessageId, filename: &str) -> Result<Vec<u8>, FetchError> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.fetch(message_id, filename).await
    }
}

/// Table that exists and reads as empty but rejects every append
pub struct ReadOnlyTable;

impl TableBackend for ReadOnlyTable {
    fn location(&self) -> String {
        "read-only".to_string()
    }

    fn table_exists(&self) -> Result<bool, StoreError> {
        Ok(true)
    }

    fn create_table(&mut self, _schema: &TableSchema) -> Result<(), StoreError> {
        Ok(())
    }

    fn validate_schema(&self, _schema: &TableSchema) -> Result<(), StoreError> {
        Ok(())
    }

    fn read_all_keys(&self) -> Result<HashSet<DedupKey>, StoreError> {
        Ok(HashSet::new())
    }

    fn append_rows(&mut self, _rows: &[StoredRow]) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "table is read-only",
        )))
    }

    fn read_all_rows(&self) -> Result<Vec<StoredRow>, StoreError> {
        Ok(Vec::new())
    }
}

/// Pipeline over `root` with an initialized store
pub async fn test_pipeline(
    root: &Path,
    fetcher: Arc<dyn AttachmentFetcher>,
    backend: StoreBackend,
) -> IngestionPipeline {
    let store_file = match backend {
        StoreBackend::Sqlite => "records.sqlite",
        StoreBackend::Csv => "records.csv",
    };
    let store = DedupStore::open(&root.join(store_file), backend).unwrap();
    pipeline_with_store(root, fetcher, store).await
}

/// Pipeline over `root` persisting into `store`
pub async fn pipeline_with_store(
    root: &Path,
    fetcher: Arc<dyn AttachmentFetcher>,
    store: DedupStore,
) -> IngestionPipeline {
    let staging = StagingDirs::under(root);
    staging.ensure().unwrap();
    store.initialize().await.unwrap();

    IngestionPipeline::new(
        fetcher,
        ArchiveExtractor::default(),
        RecordParser::default(),
        store,
        staging,
    )
}

/// Names of the regular files in `dir`, sorted
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
