use sevenz_rust::{Password, SevenZReader};
use std::io::Cursor;
use tracing::warn;

use super::{push_entry, read_capped, ArchiveHandler, RawEntry};
use crate::error::ArchiveError;

const FORMAT: &str = "7z";

/// `.7z` containers without password support
#[derive(Debug, Default, Clone, Copy)]
pub struct SevenZHandler;

impl ArchiveHandler for SevenZHandler {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[".7z"]
    }

    fn read_entries(
        &self,
        raw: &[u8],
        max_entry_bytes: u64,
    ) -> Result<Vec<RawEntry>, ArchiveError> {
        let mut reader = SevenZReader::new(Cursor::new(raw), raw.len() as u64, Password::empty())
            .map_err(|e| ArchiveError::unreadable(FORMAT, e))?;

        let mut entries = Vec::new();
        let walk = reader.for_each_entries(|entry, data| {
            if entry.is_directory() {
                return Ok(true);
            }
            let name = entry.name().to_string();
            let read = read_capped(data, max_entry_bytes);
            // solid blocks must be drained before the next entry
            let drained = !matches!(read, Ok(None))
                || std::io::copy(data, &mut std::io::sink()).is_ok();
            push_entry(&mut entries, FORMAT, name, read, max_entry_bytes);
            Ok(drained)
        });

        if let Err(e) = walk {
            if entries.is_empty() {
                return Err(ArchiveError::unreadable(FORMAT, e));
            }
            warn!(format = FORMAT, error = %e, "7z listing truncated");
        }

        Ok(entries)
    }
}
