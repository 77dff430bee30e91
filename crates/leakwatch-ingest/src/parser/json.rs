use serde_json::{Map, Value};
use tracing::debug;

use super::{FileParser, ParseContext};
use crate::models::{ContentType, ExtractedFile, Record};

/// `.json` exports shaped as a top-level array of objects.
///
/// Objects need a string `email` containing `@`. `password` falls back to an
/// empty string; the full object is kept in `additional_data`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl JsonParser {
    fn record_from(
        object: &Map<String, Value>,
        file: &ExtractedFile,
        ctx: &ParseContext<'_>,
    ) -> Option<Record> {
        let email = object.get("email")?.as_str()?;
        let password = match object.get("password") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        let additional_data = serde_json::to_string(object).ok()?;

        Record::new(
            email,
            password,
            additional_data,
            ContentType::Json,
            file.inner_filename.as_str(),
            ctx.message_id.clone(),
            ctx.parsed_at,
        )
    }
}

impl FileParser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[".json"]
    }

    fn parse_file(&self, file: &ExtractedFile, ctx: &ParseContext<'_>) -> Vec<Record> {
        let value: Value = match serde_json::from_str(&file.content) {
            Ok(value) => value,
            Err(e) => {
                debug!(file = %file.inner_filename, error = %e, "Skipping malformed JSON");
                return Vec::new();
            },
        };

        let Value::Array(items) = value else {
            debug!(file = %file.inner_filename, "Skipping JSON that is not a top-level array");
            return Vec::new();
        };

        items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|object| Self::record_from(object, file, ctx))
            .collect()
    }
}
