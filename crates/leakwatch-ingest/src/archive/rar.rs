use std::io::Write;
use std::path::Path;
use tracing::warn;
use unrar::error::{Code, UnrarError};
use unrar::Archive;

use super::{ArchiveHandler, RawEntry};
use crate::error::ArchiveError;

const FORMAT: &str = "rar";

/// `.rar` containers through the bundled unrar library.
///
/// unrar only opens archives by path, so the bytes are spilled to a private
/// temporary file for the duration of the read. A failed entry read consumes
/// the unrar cursor; the archive is then reopened and walked past every header
/// already seen.
#[derive(Debug, Default, Clone, Copy)]
pub struct RarHandler;

fn is_password_error(err: &UnrarError) -> bool {
    matches!(err.code, Code::MissingPassword | Code::BadPassword)
}

/// Progress over one spilled archive, kept across reopens
#[derive(Debug, Default)]
struct RarScan {
    entries: Vec<RawEntry>,
    headers: usize,
    encrypted: usize,
    corrupt: usize,
}

impl RarScan {
    /// Walk headers from `self.headers` onward.
    ///
    /// `Ok(true)` when the listing ended, `Ok(false)` when an entry read failed
    /// and the cursor is gone.
    fn resume(&mut self, path: &Path, max_entry_bytes: u64) -> Result<bool, UnrarError> {
        let mut archive = Archive::new(path).open_for_processing()?;
        for _ in 0..self.headers {
            archive = match archive.read_header()? {
                Some(header) => header.skip()?,
                None => return Ok(true),
            };
        }

        loop {
            let Some(header) = archive.read_header()? else {
                return Ok(true);
            };
            self.headers += 1;

            let entry = header.entry();
            let name = entry.filename.to_string_lossy().into_owned();
            let size = entry.unpacked_size;

            if entry.is_encrypted() {
                self.encrypted += 1;
                archive = header.skip()?;
                continue;
            }
            if !entry.is_file() {
                archive = header.skip()?;
                continue;
            }
            if size > max_entry_bytes {
                warn!(
                    format = FORMAT,
                    entry = %name,
                    limit = max_entry_bytes,
                    "Skipping oversized archive entry"
                );
                archive = header.skip()?;
                continue;
            }

            match header.read() {
                Ok((bytes, next)) => {
                    self.entries.push(RawEntry { name, bytes });
                    archive = next;
                },
                Err(e) if is_password_error(&e) => {
                    self.encrypted += 1;
                    return Ok(false);
                },
                Err(e) => {
                    warn!(
                        format = FORMAT,
                        entry = %name,
                        error = %e,
                        "Skipping corrupt archive entry"
                    );
                    self.corrupt += 1;
                    return Ok(false);
                },
            }
        }
    }
}

impl ArchiveHandler for RarHandler {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[".rar"]
    }

    fn read_entries(
        &self,
        raw: &[u8],
        max_entry_bytes: u64,
    ) -> Result<Vec<RawEntry>, ArchiveError> {
        let mut spill = tempfile::Builder::new()
            .prefix("leakwatch-")
            .suffix(".rar")
            .tempfile()?;
        spill.write_all(raw)?;
        spill.flush()?;

        let mut scan = RarScan::default();
        loop {
            let before = scan.headers;
            match scan.resume(spill.path(), max_entry_bytes) {
                Ok(true) => break,
                // every failed read advances past its own header
                Ok(false) if scan.headers > before => continue,
                Ok(false) => break,
                Err(e) if scan.headers == 0 && is_password_error(&e) => {
                    return Err(ArchiveError::PasswordProtected { format: FORMAT });
                },
                Err(e) if scan.headers == 0 => return Err(ArchiveError::unreadable(FORMAT, e)),
                Err(e) => {
                    warn!(
                        format = FORMAT,
                        headers = scan.headers,
                        error = %e,
                        "Rar listing truncated"
                    );
                    break;
                },
            }
        }

        if scan.entries.is_empty() {
            if scan.encrypted > 0 {
                return Err(ArchiveError::PasswordProtected { format: FORMAT });
            }
            if scan.corrupt > 0 {
                return Err(ArchiveError::unreadable(
                    FORMAT,
                    format!("none of {} entries could be read", scan.corrupt),
                ));
            }
        } else if scan.encrypted > 0 {
            warn!(
                format = FORMAT,
                encrypted = scan.encrypted,
                "Skipped password protected rar entries"
            );
        }

        Ok(scan.entries)
    }
}
