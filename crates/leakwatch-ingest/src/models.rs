//! Domain types flowing through the pipeline
//!
//! `AttachmentNotice` -> `Attachment` -> `ExtractedFile` -> `Record` -> `StoredRow`

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed `file_type` tag carried by every record
pub const FILE_TYPE_CREDENTIALS: &str = "credentials";

/// Opaque provenance identifier of the message that announced an attachment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// An attachment announced by an inbound message, not yet fetched
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentNotice {
    pub message_id: MessageId,
    pub filename: String,
}

impl AttachmentNotice {
    pub fn new(message_id: impl Into<MessageId>, filename: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            filename: filename.into(),
        }
    }
}

/// A fetched attachment payload
#[derive(Clone)]
pub struct Attachment {
    pub message_id: MessageId,
    pub filename: String,
    pub raw_bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(
        message_id: impl Into<MessageId>,
        filename: impl Into<String>,
        raw_bytes: Vec<u8>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            filename: filename.into(),
            raw_bytes,
        }
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("message_id", &self.message_id)
            .field("filename", &self.filename)
            .field("len", &self.raw_bytes.len())
            .finish()
    }
}

/// One decoded entry of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub inner_filename: String,
    pub content: String,
}

impl ExtractedFile {
    pub fn new(inner_filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            inner_filename: inner_filename.into(),
            content: content.into(),
        }
    }
}

/// Which grammar produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "email:password")]
    EmailPassword,
    #[serde(rename = "email;password;info")]
    EmailPasswordInfo,
    #[serde(rename = "json")]
    Json,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::EmailPassword => "email:password",
            ContentType::EmailPasswordInfo => "email;password;info",
            ContentType::Json => "json",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An extracted credential record
///
/// Fields are private so the `domain` invariant cannot be broken after
/// construction: `domain` is always the part of `email` after its first `@`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    timestamp: DateTime<Utc>,
    source_filename: String,
    content_type: ContentType,
    email: String,
    domain: String,
    password: String,
    additional_data: String,
    source_message_id: MessageId,
}

impl Record {
    /// Returns `None` when `email` has no `@`.
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        additional_data: impl Into<String>,
        content_type: ContentType,
        source_filename: impl Into<String>,
        source_message_id: MessageId,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        let email = email.into();
        let domain = domain_of(&email)?.to_string();
        Some(Self {
            timestamp,
            source_filename: source_filename.into(),
            content_type,
            email,
            domain,
            password: password.into(),
            additional_data: additional_data.into(),
            source_message_id,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_filename(&self) -> &str {
        &self.source_filename
    }

    pub fn file_type(&self) -> &'static str {
        FILE_TYPE_CREDENTIALS
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn additional_data(&self) -> &str {
        &self.additional_data
    }

    pub fn source_message_id(&self) -> &MessageId {
        &self.source_message_id
    }

    /// The `(email, password)` uniqueness key
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.email, &self.password)
    }
}

/// Substring after the first `@`, or `None` when there is none
pub fn domain_of(email: &str) -> Option<&str> {
    email.split_once('@').map(|(_, domain)| domain)
}

/// A persisted table row, fields in the fixed column order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRow {
    pub timestamp: String,
    pub filename: String,
    pub file_type: String,
    pub content_type: String,
    pub email: String,
    pub domain: String,
    pub password: String,
    pub additional_data: String,
    pub source_message_id: String,
}

impl From<&Record> for StoredRow {
    fn from(record: &Record) -> Self {
        Self {
            timestamp: record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            filename: record.source_filename.clone(),
            file_type: FILE_TYPE_CREDENTIALS.to_string(),
            content_type: record.content_type.as_str().to_string(),
            email: record.email.clone(),
            domain: record.domain.clone(),
            password: record.password.clone(),
            additional_data: record.additional_data.clone(),
            source_message_id: record.source_message_id.to_string(),
        }
    }
}

/// Pipeline state of one attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentState {
    Received,
    Fetched,
    Extracted,
    Parsed,
    Persisted,
    Archived,
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttachmentState::Received => "received",
            AttachmentState::Fetched => "fetched",
            AttachmentState::Extracted => "extracted",
            AttachmentState::Parsed => "parsed",
            AttachmentState::Persisted => "persisted",
            AttachmentState::Archived => "archived",
        };
        f.write_str(name)
    }
}

/// Terminal result of handling one attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Archived; number of rows actually inserted
    Success(usize),
    /// Ignored at RECEIVED
    Skipped(String),
    /// `stage` is the last state reached before the failure
    Failed { stage: AttachmentState, reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn inserted(&self) -> usize {
        match self {
            Outcome::Success(n) => *n,
            _ => 0,
        }
    }
}
