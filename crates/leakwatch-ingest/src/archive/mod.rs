//! Archive extraction
//!
//! Turns compressed attachment bytes into decoded [`ExtractedFile`]s.
//!
//! # Supported Formats
//!
//! | Suffix               | Handler                        |
//! |----------------------|--------------------------------|
//! | `.zip`               | [`ZipHandler`]                 |
//! | `.rar`               | `RarHandler` (feature `rar`)   |
//! | `.tar`               | [`TarHandler::plain`]          |
//! | `.tar.gz`, `.tgz`    | [`TarHandler::gzip`]           |
//! | `.tar.bz2`, `.tbz2`  | [`TarHandler::bzip2`]          |
//! | `.7z`                | `SevenZHandler` (feature `sevenz`) |
//!
//! Dispatch is by case-insensitive filename suffix, longest suffix first.
//! Anything else resolves to [`NoopHandler`], which yields no files. A format
//! whose feature is disabled still claims its suffix through
//! [`DisabledHandler`] and fails with [`ArchiveError::Unsupported`].
//!
//! A container that cannot be opened is an [`ArchiveError`]; a single
//! corrupt or oversized entry is logged and skipped so its siblings still
//! extract.
//!
//! # Examples
//!
//! ```rust,no_run
//! use leakwatch_ingest::archive::{ArchiveExtractor, DecodePolicy};
//!
//! # fn run(raw: &[u8]) -> anyhow::Result<()> {
//! let extractor = ArchiveExtractor::new(DecodePolicy::Replace);
//! for file in extractor.extract(raw, "leak.zip")? {
//!     println!("{}: {} chars", file.inner_filename, file.content.len());
//! }
//! # Ok(())
//! # }
//! ```

mod tarball;
mod zipfile;

#[cfg(feature = "rar")]
mod rar;
#[cfg(feature = "sevenz")]
mod sevenz;

pub use tarball::{TarCompression, TarHandler};
pub use zipfile::ZipHandler;

#[cfg(feature = "rar")]
pub use rar::RarHandler;
#[cfg(feature = "sevenz")]
pub use sevenz::SevenZHandler;

use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::{debug, warn};

use crate::error::ArchiveError;
use crate::models::ExtractedFile;

/// Default cap on a single decompressed entry (256 MiB)
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// How undecodable byte sequences inside an entry are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Each invalid sequence becomes U+FFFD
    #[default]
    Replace,
    /// Invalid sequences are dropped
    Ignore,
}

impl DecodePolicy {
    /// Decode entry bytes as UTF-8 without ever failing. A leading BOM is stripped.
    pub fn decode(self, bytes: &[u8]) -> String {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let mut text = String::with_capacity(bytes.len());
        for chunk in bytes.utf8_chunks() {
            text.push_str(chunk.valid());
            if !chunk.invalid().is_empty() && self == DecodePolicy::Replace {
                text.push(char::REPLACEMENT_CHARACTER);
            }
        }
        text
    }
}

impl std::str::FromStr for DecodePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replace" | "lossy" => Ok(DecodePolicy::Replace),
            "ignore" | "drop" => Ok(DecodePolicy::Ignore),
            _ => Err(anyhow::anyhow!("Invalid decode policy: {}", s)),
        }
    }
}

/// Undecoded archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// One container format
pub trait ArchiveHandler: Send + Sync {
    /// Short format name used in logs and errors
    fn format(&self) -> &'static str;

    /// Lowercase filename suffixes this handler claims, including the dot
    fn suffixes(&self) -> &'static [&'static str];

    /// Read every regular-file entry no larger than `max_entry_bytes`.
    ///
    /// Errors only when the container itself is unreadable.
    fn read_entries(&self, raw: &[u8], max_entry_bytes: u64)
        -> Result<Vec<RawEntry>, ArchiveError>;
}

/// Fallback for unrecognized suffixes
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ArchiveHandler for NoopHandler {
    fn format(&self) -> &'static str {
        "none"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[]
    }

    fn read_entries(&self, _raw: &[u8], _max: u64) -> Result<Vec<RawEntry>, ArchiveError> {
        Ok(Vec::new())
    }
}

/// Placeholder for a format compiled out of this build
#[derive(Debug, Clone, Copy)]
pub struct DisabledHandler {
    format: &'static str,
    suffixes: &'static [&'static str],
}

impl DisabledHandler {
    pub const fn new(format: &'static str, suffixes: &'static [&'static str]) -> Self {
        Self { format, suffixes }
    }
}

impl ArchiveHandler for DisabledHandler {
    fn format(&self) -> &'static str {
        self.format
    }

    fn suffixes(&self) -> &'static [&'static str] {
        self.suffixes
    }

    fn read_entries(&self, _raw: &[u8], _max: u64) -> Result<Vec<RawEntry>, ArchiveError> {
        Err(ArchiveError::Unsupported {
            format: self.format,
        })
    }
}

/// Suffix-dispatched extractor with an explicit decoding policy
pub struct ArchiveExtractor {
    handlers: Vec<Box<dyn ArchiveHandler>>,
    fallback: NoopHandler,
    policy: DecodePolicy,
    max_entry_bytes: u64,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new(DecodePolicy::default())
    }
}

impl ArchiveExtractor {
    /// Extractor with every built-in handler enabled by the crate features
    pub fn new(policy: DecodePolicy) -> Self {
        let extractor = Self::empty(policy)
            .register(ZipHandler)
            .register(TarHandler::plain())
            .register(TarHandler::gzip())
            .register(TarHandler::bzip2());

        #[cfg(feature = "rar")]
        let extractor = extractor.register(RarHandler);
        #[cfg(not(feature = "rar"))]
        let extractor = extractor.register(DisabledHandler::new("rar", &[".rar"]));

        #[cfg(feature = "sevenz")]
        let extractor = extractor.register(SevenZHandler);
        #[cfg(not(feature = "sevenz"))]
        let extractor = extractor.register(DisabledHandler::new("7z", &[".7z"]));

        extractor
    }

    /// Extractor with no handlers; every filename resolves to [`NoopHandler`]
    pub fn empty(policy: DecodePolicy) -> Self {
        Self {
            handlers: Vec::new(),
            fallback: NoopHandler,
            policy,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }

    pub fn register(mut self, handler: impl ArchiveHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_max_entry_bytes(mut self, max_entry_bytes: u64) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Every registered suffix
    pub fn suffixes(&self) -> Vec<&'static str> {
        self.handlers.iter().flat_map(|h| h.suffixes().iter().copied()).collect()
    }

    fn lookup(&self, filename: &str) -> Option<&dyn ArchiveHandler> {
        let lower = filename.to_lowercase();
        self.handlers
            .iter()
            .filter_map(|handler| {
                handler
                    .suffixes()
                    .iter()
                    .filter(|suffix| lower.ends_with(*suffix))
                    .map(|suffix| suffix.len())
                    .max()
                    .map(|len| (len, handler.as_ref()))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, handler)| handler)
    }

    /// Handler for `filename`, or the no-op fallback
    pub fn handler_for(&self, filename: &str) -> &dyn ArchiveHandler {
        self.lookup(filename).unwrap_or(&self.fallback)
    }

    /// Whether `filename` carries a recognized archive suffix
    pub fn supports(&self, filename: &str) -> bool {
        self.lookup(filename).is_some()
    }

    /// Decode every entry of the archive named `filename`
    pub fn extract(&self, raw: &[u8], filename: &str) -> Result<Vec<ExtractedFile>, ArchiveError> {
        let handler = self.handler_for(filename);
        let entries = handler.read_entries(raw, self.max_entry_bytes)?;

        debug!(
            archive = filename,
            format = handler.format(),
            entries = entries.len(),
            "Archive read"
        );

        Ok(entries
            .into_iter()
            .map(|entry| ExtractedFile::new(entry.name, self.policy.decode(&entry.bytes)))
            .collect())
    }
}

/// Read at most `limit` bytes; `Ok(None)` when the entry is larger.
pub(crate) fn read_capped(reader: &mut dyn Read, limit: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut bytes = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        Ok(None)
    } else {
        Ok(Some(bytes))
    }
}

/// Shared per-entry bookkeeping for handlers
pub(crate) fn push_entry(
    entries: &mut Vec<RawEntry>,
    format: &'static str,
    name: String,
    read: std::io::Result<Option<Vec<u8>>>,
    limit: u64,
) {
    match read {
        Ok(Some(bytes)) => entries.push(RawEntry { name, bytes }),
        Ok(None) => warn!(format, entry = %name, limit, "Skipping oversized archive entry"),
        Err(e) => warn!(format, entry = %name, error = %e, "Skipping corrupt archive entry"),
    }
}
