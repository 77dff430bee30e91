//! Deduplicated, append-only record table
//!
//! [`DedupStore`] is the only shared mutable resource of the pipeline. It is a
//! cheap cloneable handle around one [`TableBackend`]; every backend call goes
//! through a single async mutex, so concurrent attachments never interleave a
//! key read with another writer's append.
//!
//! Backends:
//!
//! - [`SqliteTable`]: one transaction per batch, `UNIQUE(email, password)`
//! - [`CsvTable`]: copy, append, fsync, atomic rename

mod csvfile;
mod sqlite;

pub use csvfile::CsvTable;
pub use sqlite::SqliteTable;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{Record, StoredRow};

/// Owned `(email, password)` uniqueness key
pub type DedupKey = (String, String);

/// Column layout of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: &'static [&'static str],
    pub key: &'static [&'static str],
}

/// Column order fixed for compatibility with existing exports
pub const RECORD_SCHEMA: TableSchema = TableSchema {
    columns: &[
        "timestamp",
        "filename",
        "file_type",
        "content_type",
        "email",
        "domain",
        "password",
        "additional_data",
        "source_message_id",
    ],
    key: &["email", "password"],
};

impl TableSchema {
    pub(crate) fn check_columns(&self, found: &[String]) -> Result<(), StoreError> {
        if found.iter().map(String::as_str).eq(self.columns.iter().copied()) {
            Ok(())
        } else {
            Err(StoreError::SchemaMismatch {
                expected: self.columns.join(","),
                found: found.join(","),
            })
        }
    }
}

/// Storage engine behind the store. Calls are blocking and always serialized
/// by [`DedupStore`].
pub trait TableBackend: Send + 'static {
    /// Human-readable location for logs
    fn location(&self) -> String;

    fn table_exists(&self) -> Result<bool, StoreError>;

    /// Create the table; must not touch an existing one
    fn create_table(&mut self, schema: &TableSchema) -> Result<(), StoreError>;

    /// Fail when an existing table has a different column set
    fn validate_schema(&self, schema: &TableSchema) -> Result<(), StoreError>;

    fn read_all_keys(&self) -> Result<HashSet<DedupKey>, StoreError>;

    /// Append all rows or none of them
    fn append_rows(&mut self, rows: &[StoredRow]) -> Result<(), StoreError>;

    fn read_all_rows(&self) -> Result<Vec<StoredRow>, StoreError>;
}

/// Which backend a store path uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Csv,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "db" => Ok(StoreBackend::Sqlite),
            "csv" => Ok(StoreBackend::Csv),
            _ => Err(anyhow::anyhow!("Invalid store backend: {}", s)),
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Sqlite => write!(f, "sqlite"),
            StoreBackend::Csv => write!(f, "csv"),
        }
    }
}

/// Keep the first record of every key that is neither stored nor seen earlier in the batch
pub fn select_new(existing: &HashSet<DedupKey>, records: Vec<Record>) -> Vec<Record> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let (email, password) = record.dedup_key();
            let key = (email.to_string(), password.to_string());
            !existing.contains(&key) && seen.insert(key)
        })
        .collect()
}

/// Handle to the durable, deduplicated record table
#[derive(Clone)]
pub struct DedupStore {
    backend: Arc<Mutex<Box<dyn TableBackend>>>,
    location: Arc<str>,
}

impl DedupStore {
    pub fn new(backend: impl TableBackend) -> Self {
        let location: Arc<str> = backend.location().into();
        Self {
            backend: Arc::new(Mutex::new(Box::new(backend))),
            location,
        }
    }

    /// Open `path` with the given backend. The table is not created; call
    /// [`DedupStore::initialize`].
    pub fn open(path: &Path, kind: StoreBackend) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(match kind {
            StoreBackend::Sqlite => Self::new(SqliteTable::open(path)?),
            StoreBackend::Csv => Self::new(CsvTable::new(path)),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run `op` on the blocking pool while holding the writer lock.
    ///
    /// The lock guard moves into the blocking task, so a caller that is
    /// dropped mid-call cannot release the lock before the write finishes.
    async fn with_backend<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TableBackend) -> Result<T, StoreError> + Send + 'static,
    {
        let mut guard = self.backend.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || op(&mut **guard))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Create the table when absent, otherwise check its columns.
    /// Returns whether the table was created.
    pub async fn initialize(&self) -> Result<bool, StoreError> {
        let created = self
            .with_backend(|backend| {
                if backend.table_exists()? {
                    backend.validate_schema(&RECORD_SCHEMA)?;
                    Ok(false)
                } else {
                    backend.create_table(&RECORD_SCHEMA)?;
                    Ok(true)
                }
            })
            .await?;

        info!(store = %self.location, created, "Store initialized");
        Ok(created)
    }

    /// Append records whose key is new; returns how many were inserted
    pub async fn append_batch(&self, records: Vec<Record>) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let offered = records.len();
        let location = self.location.clone();
        let inserted = self
            .with_backend(move |backend| {
                if !backend.table_exists()? {
                    return Err(StoreError::NotInitialized(location.to_string()));
                }
                let existing = backend.read_all_keys()?;
                let fresh = select_new(&existing, records);
                if fresh.is_empty() {
                    return Ok(0);
                }
                let rows: Vec<StoredRow> = fresh.iter().map(StoredRow::from).collect();
                backend.append_rows(&rows)?;
                Ok(rows.len())
            })
            .await?;

        debug!(store = %self.location, offered, inserted, "Batch appended");
        Ok(inserted)
    }

    /// Every persisted row in insertion order
    pub async fn rows(&self) -> Result<Vec<StoredRow>, StoreError> {
        self.with_backend(|backend| backend.read_all_rows()).await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.with_backend(|backend| Ok(backend.read_all_keys()?.len())).await
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}
