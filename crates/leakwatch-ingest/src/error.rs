//! Error taxonomy for the ingestion pipeline
//!
//! Line, entry and object level noise never reaches these types: it is
//! skipped where it is found. What remains are attachment-level failures
//! (fetch, archive, staging) and store-level failures.

use thiserror::Error;

/// Transport or authentication failure while acquiring attachment bytes
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("attachment not found: {0}")]
    NotFound(String),

    #[error("fetch unauthorized ({status}) for {url}")]
    Auth { status: u16, url: String },

    #[error("fetch returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid fetch target: {0}")]
    InvalidTarget(String),

    #[error("IO error while fetching: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// The archive container could not be read
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{format} archive unreadable: {reason}")]
    Unreadable { format: &'static str, reason: String },

    #[error("{format} archive is password protected")]
    PasswordProtected { format: &'static str },

    #[error("{format} support is not enabled in this build")]
    Unsupported { format: &'static str },

    #[error("IO error while reading archive: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub(crate) fn unreadable(format: &'static str, reason: impl ToString) -> Self {
        ArchiveError::Unreadable {
            format,
            reason: reason.to_string(),
        }
    }
}

/// Persistence failure. Nothing from the failing batch is committed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to replace table file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("table schema mismatch: expected [{expected}], found [{found}]")]
    SchemaMismatch { expected: String, found: String },

    #[error("store table not initialized at {0}")]
    NotInitialized(String),

    #[error("store task failed: {0}")]
    Task(String),
}

/// Attachment-level failure, terminal for that attachment only
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("staging IO error: {0}")]
    Staging(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Task(err.to_string())
    }
}
