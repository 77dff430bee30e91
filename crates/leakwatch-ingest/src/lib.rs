//! Leakwatch Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Turns archive attachments announced by a message stream into
//! deduplicated credential records.
//!
//! # Components
//!
//! - **[`archive`]**: zip, rar, tar (plain/gzip/bzip2) and 7z extraction
//! - **[`parser`]**: heuristic line and JSON record extraction
//! - **[`store`]**: append-only table deduplicated on `(email, password)`
//! - **[`pipeline`]**: per-attachment fetch, extract, parse, persist, archive
//! - **[`monitor`]**: bounded concurrent driver with graceful shutdown
//! - **[`fetch`]** / **[`source`]**: attachment transports and notice streams
//!
//! # Example
//!
//! ```no_run
//! use leakwatch_ingest::archive::ArchiveExtractor;
//! use leakwatch_ingest::fetch::SpoolFetcher;
//! use leakwatch_ingest::models::Attachment;
//! use leakwatch_ingest::parser::RecordParser;
//! use leakwatch_ingest::pipeline::{IngestionPipeline, StagingDirs};
//! use leakwatch_ingest::store::{DedupStore, StoreBackend};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = DedupStore::open(Path::new("./data/records.sqlite"), StoreBackend::Sqlite)?;
//!     store.initialize().await?;
//!
//!     let staging = StagingDirs::under("./data");
//!     staging.ensure()?;
//!
//!     let pipeline = IngestionPipeline::new(
//!         Arc::new(SpoolFetcher::new("./data/inbox")),
//!         ArchiveExtractor::default(),
//!         RecordParser::default(),
//!         store,
//!         staging,
//!     );
//!     let outcome = pipeline
//!         .ingest_bytes(Attachment::new("local-1", "leak.zip", std::fs::read("leak.zip")?))
//!         .await;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod monitor;
pub mod parser;
pub mod pipeline;
pub mod source;
pub mod store;

pub use config::IngestConfig;
pub use error::{ArchiveError, FetchError, PipelineError, StoreError};
pub use models::{Attachment, AttachmentNotice, MessageId, Outcome, Record};
pub use monitor::{Monitor, MonitorStats};
pub use pipeline::IngestionPipeline;
pub use store::DedupStore;
