use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use std::io::Read;
use tracing::warn;

use super::{push_entry, read_capped, ArchiveHandler, RawEntry};
use crate::error::ArchiveError;

/// Outer compression wrapped around a tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Bzip2,
}

/// `.tar`, `.tar.gz`/`.tgz` and `.tar.bz2`/`.tbz2` containers
#[derive(Debug, Clone, Copy)]
pub struct TarHandler {
    compression: TarCompression,
}

impl TarHandler {
    pub fn plain() -> Self {
        Self {
            compression: TarCompression::None,
        }
    }

    pub fn gzip() -> Self {
        Self {
            compression: TarCompression::Gzip,
        }
    }

    pub fn bzip2() -> Self {
        Self {
            compression: TarCompression::Bzip2,
        }
    }

    pub fn compression(&self) -> TarCompression {
        self.compression
    }
}

impl ArchiveHandler for TarHandler {
    fn format(&self) -> &'static str {
        match self.compression {
            TarCompression::None => "tar",
            TarCompression::Gzip => "tar.gz",
            TarCompression::Bzip2 => "tar.bz2",
        }
    }

    fn suffixes(&self) -> &'static [&'static str] {
        match self.compression {
            TarCompression::None => &[".tar"],
            TarCompression::Gzip => &[".tar.gz", ".tgz"],
            TarCompression::Bzip2 => &[".tar.bz2", ".tbz2"],
        }
    }

    fn read_entries(
        &self,
        raw: &[u8],
        max_entry_bytes: u64,
    ) -> Result<Vec<RawEntry>, ArchiveError> {
        let format = self.format();
        match self.compression {
            TarCompression::None => read_tar(raw, format, max_entry_bytes),
            TarCompression::Gzip => read_tar(MultiGzDecoder::new(raw), format, max_entry_bytes),
            TarCompression::Bzip2 => read_tar(BzDecoder::new(raw), format, max_entry_bytes),
        }
    }
}

/// Tar streams are read sequentially: an error before the first header means the
/// container is unreadable, a later one truncates the listing.
fn read_tar<R: Read>(
    reader: R,
    format: &'static str,
    max_entry_bytes: u64,
) -> Result<Vec<RawEntry>, ArchiveError> {
    let mut archive = tar::Archive::new(reader);
    let iter = archive
        .entries()
        .map_err(|e| ArchiveError::unreadable(format, e))?;

    let mut entries = Vec::new();
    let mut headers_read = 0usize;

    for entry in iter {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) if headers_read == 0 => return Err(ArchiveError::unreadable(format, e)),
            Err(e) => {
                warn!(
                    format,
                    headers_read,
                    error = %e,
                    "Tar stream truncated, keeping earlier entries"
                );
                break;
            },
        };
        headers_read += 1;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = match entry.path() {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                warn!(format, error = %e, "Skipping tar entry with unreadable path");
                continue;
            },
        };

        let read = read_capped(&mut entry, max_entry_bytes);
        push_entry(&mut entries, format, name, read, max_entry_bytes);
    }

    Ok(entries)
}
