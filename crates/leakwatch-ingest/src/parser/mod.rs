//! Record extraction from decoded archive entries
//!
//! Each inner file is routed by its (case-insensitive) suffix to a
//! [`FileParser`]:
//!
//! - `.txt`, `.csv` -> [`LineParser`] (line grammars)
//! - `.json` -> [`JsonParser`] (top-level array of objects)
//! - anything else -> [`NoopParser`]
//!
//! Parsing never fails. Lines, objects and whole files without recognizable
//! structure are skipped: noise is the normal case for this input.

mod json;
mod lines;

pub use json::JsonParser;
pub use lines::{match_line, ColonGrammar, LineGrammar, LineMatch, LineParser, SemicolonGrammar};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{ExtractedFile, MessageId, Record};

/// Provenance and clock shared by every record of one `parse` call
#[derive(Debug, Clone)]
pub struct ParseContext<'a> {
    pub message_id: &'a MessageId,
    pub parsed_at: DateTime<Utc>,
}

/// One inner-file format
pub trait FileParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lowercase suffixes including the dot
    fn suffixes(&self) -> &'static [&'static str];

    fn parse_file(&self, file: &ExtractedFile, ctx: &ParseContext<'_>) -> Vec<Record>;
}

/// Fallback for inner files of no interest
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopParser;

impl FileParser for NoopParser {
    fn name(&self) -> &'static str {
        "none"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[]
    }

    fn parse_file(&self, _file: &ExtractedFile, _ctx: &ParseContext<'_>) -> Vec<Record> {
        Vec::new()
    }
}

/// Suffix-dispatched record parser
pub struct RecordParser {
    parsers: Vec<Box<dyn FileParser>>,
    fallback: NoopParser,
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::empty().register(LineParser::default()).register(JsonParser)
    }
}

impl RecordParser {
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
            fallback: NoopParser,
        }
    }

    pub fn register(mut self, parser: impl FileParser + 'static) -> Self {
        self.parsers.push(Box::new(parser));
        self
    }

    pub fn parser_for(&self, inner_filename: &str) -> &dyn FileParser {
        let lower = inner_filename.to_lowercase();
        self.parsers
            .iter()
            .find(|parser| parser.suffixes().iter().any(|suffix| lower.ends_with(suffix)))
            .map(|parser| parser.as_ref())
            .unwrap_or(&self.fallback)
    }

    /// Extract records from every file, stamped with the current time
    pub fn parse(&self, files: &[ExtractedFile], message_id: &MessageId) -> Vec<Record> {
        self.parse_at(files, message_id, Utc::now())
    }

    pub fn parse_at(
        &self,
        files: &[ExtractedFile],
        message_id: &MessageId,
        parsed_at: DateTime<Utc>,
    ) -> Vec<Record> {
        let ctx = ParseContext {
            message_id,
            parsed_at,
        };

        let mut records = Vec::new();
        for file in files {
            let parser = self.parser_for(&file.inner_filename);
            let found = parser.parse_file(file, &ctx);
            debug!(
                file = %file.inner_filename,
                parser = parser.name(),
                records = found.len(),
                "Parsed inner file"
            );
            records.extend(found);
        }
        records
    }
}
