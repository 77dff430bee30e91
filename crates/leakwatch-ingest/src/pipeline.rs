//! Per-attachment ingestion flow
//!
//! ```text
//! RECEIVED -> FETCHED -> EXTRACTED -> PARSED -> PERSISTED -> ARCHIVED
//!     \__________\___________\__________\___________\-----> FAILED
//! ```
//!
//! Fetched bytes are staged to `working/`. On success the staged file is
//! renamed into `processed/`; on failure it is moved to `quarantine/` next to
//! a `<name>.error.json` note. Nothing that was fetched is ever deleted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use leakwatch_common::checksum;

use crate::archive::ArchiveExtractor;
use crate::error::PipelineError;
use crate::fetch::AttachmentFetcher;
use crate::models::{Attachment, AttachmentNotice, AttachmentState, MessageId, Outcome};
use crate::parser::RecordParser;
use crate::store::DedupStore;

/// Working, processed and quarantine areas under one data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDirs {
    pub working: PathBuf,
    pub processed: PathBuf,
    pub quarantine: PathBuf,
}

impl StagingDirs {
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            working: root.join("working"),
            processed: root.join("processed"),
            quarantine: root.join("quarantine"),
        }
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.working, &self.processed, &self.quarantine] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Final path component of an announced filename; `None` when nothing usable is left
pub fn sanitize_filename(filename: &str) -> Option<&str> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// `<message_id>-<filename>` with the id made safe for a single path component
fn staged_name(message_id: &MessageId, filename: &str) -> String {
    let id: String = message_id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{id}-{filename}")
}

/// Sidecar written next to a quarantined input
#[derive(Debug, Serialize)]
struct QuarantineNote<'a> {
    message_id: &'a str,
    filename: &'a str,
    stage: AttachmentState,
    reason: &'a str,
    sha256: Option<String>,
    failed_at: DateTime<Utc>,
}

struct Failure {
    stage: AttachmentState,
    error: PipelineError,
}

/// Tag an error with the last state the attachment reached
fn at<E: Into<PipelineError>>(stage: AttachmentState) -> impl FnOnce(E) -> Failure {
    move |err| Failure {
        stage,
        error: err.into(),
    }
}

/// Orchestrates fetch, extraction, parsing, persistence and archival
pub struct IngestionPipeline {
    fetcher: Arc<dyn AttachmentFetcher>,
    extractor: Arc<ArchiveExtractor>,
    parser: Arc<RecordParser>,
    store: DedupStore,
    staging: StagingDirs,
}

impl IngestionPipeline {
    pub fn new(
        fetcher: Arc<dyn AttachmentFetcher>,
        extractor: ArchiveExtractor,
        parser: RecordParser,
        store: DedupStore,
        staging: StagingDirs,
    ) -> Self {
        Self {
            fetcher,
            extractor: Arc::new(extractor),
            parser: Arc::new(parser),
            store,
            staging,
        }
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    pub fn staging(&self) -> &StagingDirs {
        &self.staging
    }

    /// Whether an attachment with this name would be processed
    pub fn accepts(&self, filename: &str) -> bool {
        sanitize_filename(filename).is_some_and(|name| self.extractor.supports(name))
    }

    fn gate<'a>(&self, filename: &'a str) -> Result<&'a str, Outcome> {
        let Some(name) = sanitize_filename(filename) else {
            return Err(Outcome::Skipped(format!("unusable filename '{filename}'")));
        };
        if !self.extractor.supports(name) {
            debug!(filename = name, "Ignoring non-archive attachment");
            return Err(Outcome::Skipped(format!("not a recognized archive: {name}")));
        }
        Ok(name)
    }

    /// Run one announced attachment to a terminal outcome
    #[instrument(
        skip(self, notice),
        fields(message_id = %notice.message_id, filename = %notice.filename)
    )]
    pub async fn handle_attachment(&self, notice: AttachmentNotice) -> Outcome {
        let filename = match self.gate(&notice.filename) {
            Ok(name) => name,
            Err(skipped) => return skipped,
        };

        let bytes = match self.fetcher.fetch(&notice.message_id, filename).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = PipelineError::from(e);
                error!(error = %error, "Attachment fetch failed");
                return Outcome::Failed {
                    stage: AttachmentState::Received,
                    reason: error.to_string(),
                };
            },
        };

        self.process(&notice.message_id, filename, bytes).await
    }

    /// Run bytes the caller already holds, entering the flow at FETCHED
    #[instrument(
        skip(self, attachment),
        fields(message_id = %attachment.message_id, filename = %attachment.filename)
    )]
    pub async fn ingest_bytes(&self, attachment: Attachment) -> Outcome {
        let Attachment {
            message_id,
            filename,
            raw_bytes,
        } = attachment;

        let name = match self.gate(&filename) {
            Ok(name) => name,
            Err(skipped) => return skipped,
        };

        self.process(&message_id, name, raw_bytes).await
    }

    async fn process(&self, message_id: &MessageId, filename: &str, bytes: Vec<u8>) -> Outcome {
        let staged_as = staged_name(message_id, filename);
        let staged = self.staging.working.join(&staged_as);

        debug!(bytes = bytes.len(), staged = %staged.display(), "Staging attachment");
        if let Err(e) = tokio::fs::write(&staged, &bytes).await {
            let error = PipelineError::Staging(e);
            error!(error = %error, "Could not stage attachment");
            return Outcome::Failed {
                stage: AttachmentState::Fetched,
                reason: error.to_string(),
            };
        }

        match self.run_stages(message_id, filename, &staged, &staged_as, bytes).await {
            Ok(inserted) => {
                info!(inserted, "Attachment ingested");
                Outcome::Success(inserted)
            },
            Err(failure) => {
                let reason = failure.error.to_string();
                error!(stage = %failure.stage, error = %reason, "Attachment failed");
                self.quarantine(message_id, filename, &staged, &staged_as, failure.stage, &reason)
                    .await;
                Outcome::Failed {
                    stage: failure.stage,
                    reason,
                }
            },
        }
    }

    async fn run_stages(
        &self,
        message_id: &MessageId,
        filename: &str,
        staged: &Path,
        staged_as: &str,
        bytes: Vec<u8>,
    ) -> Result<usize, Failure> {
        let extractor = self.extractor.clone();
        let name = filename.to_string();
        let files = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &name))
            .await
            .map_err(at(AttachmentState::Fetched))?
            .map_err(at(AttachmentState::Fetched))?;
        debug!(files = files.len(), "Archive extracted");

        let parser = self.parser.clone();
        let id = message_id.clone();
        let records = tokio::task::spawn_blocking(move || parser.parse(&files, &id))
            .await
            .map_err(at(AttachmentState::Extracted))?;
        debug!(records = records.len(), "Records parsed");

        let inserted = self
            .store
            .append_batch(records)
            .await
            .map_err(at(AttachmentState::Parsed))?;

        let archived = self.staging.processed.join(staged_as);
        tokio::fs::rename(staged, &archived)
            .await
            .map_err(at(AttachmentState::Persisted))?;
        debug!(archived = %archived.display(), "Attachment archived");

        Ok(inserted)
    }

    async fn quarantine(
        &self,
        message_id: &MessageId,
        filename: &str,
        staged: &Path,
        staged_as: &str,
        stage: AttachmentState,
        reason: &str,
    ) {
        let target = self.staging.quarantine.join(staged_as);
        if let Err(e) = tokio::fs::rename(staged, &target).await {
            warn!(error = %e, staged = %staged.display(), "Could not move input to quarantine");
            return;
        }

        let digest_path = target.clone();
        let digest = tokio::task::spawn_blocking(move || checksum::sha256_file(digest_path)).await;
        let sha256 = match digest {
            Ok(Ok(digest)) => Some(digest),
            Ok(Err(e)) => {
                warn!(error = %e, "Could not fingerprint quarantined input");
                None
            },
            Err(e) => {
                warn!(error = %e, "Fingerprint task failed");
                None
            },
        };

        let note = QuarantineNote {
            message_id: message_id.as_str(),
            filename,
            stage,
            reason,
            sha256,
            failed_at: Utc::now(),
        };
        let note_path = self.staging.quarantine.join(format!("{staged_as}.error.json"));
        let written = match serde_json::to_vec_pretty(&note) {
            Ok(body) => tokio::fs::write(&note_path, body).await,
            Err(e) => Err(e.into()),
        };
        match written {
            Ok(()) => info!(quarantined = %target.display(), "Input quarantined"),
            Err(e) => {
                warn!(error = %e, note = %note_path.display(), "Could not write quarantine note")
            },
        }
    }
}
