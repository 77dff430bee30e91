use std::io::Cursor;
use tracing::warn;
use zip::result::ZipError;
use zip::ZipArchive;

use super::{push_entry, read_capped, ArchiveHandler, RawEntry};
use crate::error::ArchiveError;

const FORMAT: &str = "zip";

/// `.zip` containers
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipHandler;

impl ArchiveHandler for ZipHandler {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[".zip"]
    }

    fn read_entries(
        &self,
        raw: &[u8],
        max_entry_bytes: u64,
    ) -> Result<Vec<RawEntry>, ArchiveError> {
        let mut archive =
            ZipArchive::new(Cursor::new(raw)).map_err(|e| ArchiveError::unreadable(FORMAT, e))?;

        let mut entries = Vec::new();
        let mut encrypted = 0usize;

        for index in 0..archive.len() {
            let mut file = match archive.by_index(index) {
                Ok(file) => file,
                Err(ZipError::UnsupportedArchive(msg)) if msg == ZipError::PASSWORD_REQUIRED => {
                    encrypted += 1;
                    continue;
                },
                Err(e) => {
                    warn!(format = FORMAT, index, error = %e, "Skipping unreadable zip entry");
                    continue;
                },
            };

            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            let read = read_capped(&mut file, max_entry_bytes);
            push_entry(&mut entries, FORMAT, name, read, max_entry_bytes);
        }

        if encrypted > 0 {
            warn!(format = FORMAT, encrypted, "Skipped password protected zip entries");
            if entries.is_empty() {
                return Err(ArchiveError::PasswordProtected { format: FORMAT });
            }
        }

        Ok(entries)
    }
}
