//! Archive fixtures built in memory

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use flate2::{Compression, Crc};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builder for zip archives with stored (uncompressed) entries
#[derive(Debug, Clone, Default)]
pub struct ZipFixture {
    files: Vec<(String, Vec<u8>)>,
    dirs: Vec<String>,
}

impl ZipFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.files.push((name.into(), content.as_ref().to_vec()));
        self
    }

    pub fn dir(mut self, name: impl Into<String>) -> Self {
        self.dirs.push(name.into());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);

        for dir in &self.dirs {
            writer.add_directory(dir.as_str(), options).unwrap();
        }
        for (name, content) in &self.files {
            writer.start_file(name.as_str(), options).unwrap();
            writer.write_all(content).unwrap();
        }

        writer.finish().unwrap().into_inner()
    }
}

/// Set the "encrypted" general purpose bit on every local and central zip header
pub fn mark_zip_encrypted(mut archive: Vec<u8>) -> Vec<u8> {
    for (signature, flags_at) in [(b"PK\x03\x04", 6), (b"PK\x01\x02", 8)] {
        let starts: Vec<usize> = archive
            .windows(4)
            .enumerate()
            .filter(|(_, window)| *window == &signature[..])
            .map(|(at, _)| at)
            .collect();
        for at in starts {
            archive[at + flags_at] |= 0x01;
        }
    }
    archive
}

/// Overwrite the first occurrence of `marker` in `archive` so that entry's CRC no longer matches
pub fn corrupt_entry(mut archive: Vec<u8>, marker: &[u8]) -> Vec<u8> {
    let at = archive
        .windows(marker.len())
        .position(|window| window == marker)
        .expect("marker present in archive");
    for byte in &mut archive[at..at + marker.len()] {
        *byte = b'#';
    }
    archive
}

/// Builder for tar archives, optionally gzip-compressed
#[derive(Debug, Clone, Default)]
pub struct TarFixture {
    files: Vec<(String, Vec<u8>)>,
}

impl TarFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.files.push((name.into(), content.as_ref().to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in &self.files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_slice())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    pub fn build_gz(&self) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.build()).unwrap();
        encoder.finish().unwrap()
    }

    pub fn build_bz2(&self) -> Vec<u8> {
        let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(&self.build()).unwrap();
        encoder.finish().unwrap()
    }
}

const RAR4_MARKER: &[u8] = b"Rar!\x1a\x07\x00";
const RAR4_MAIN_HEAD: u8 = 0x73;
const RAR4_FILE_HEAD: u8 = 0x74;
const RAR4_END_HEAD: u8 = 0x7b;
const RAR4_LONG_BLOCK: u16 = 0x8000;
const RAR4_PASSWORD: u16 = 0x0004;
const RAR4_STORED: u8 = 0x30;

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(bytes);
    crc.sum()
}

/// One RAR 4.x block: HEAD_CRC covers everything after itself
fn rar4_block(head_type: u8, flags: u16, body: &[u8]) -> Vec<u8> {
    let size = u16::try_from(7 + body.len()).unwrap();
    let mut covered = vec![head_type];
    covered.extend_from_slice(&flags.to_le_bytes());
    covered.extend_from_slice(&size.to_le_bytes());
    covered.extend_from_slice(body);

    let mut block = ((crc32(&covered) & 0xffff) as u16).to_le_bytes().to_vec();
    block.extend_from_slice(&covered);
    block
}

#[derive(Debug, Clone)]
struct RarEntry {
    name: String,
    content: Vec<u8>,
    bad_crc: bool,
    locked: bool,
}

/// Builder for RAR 4.x archives with stored (method 0x30) entries
#[derive(Debug, Clone, Default)]
pub struct RarFixture {
    entries: Vec<RarEntry>,
}

impl RarFixture {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        mut self,
        name: impl Into<String>,
        content: impl AsRef<[u8]>,
        bad_crc: bool,
        locked: bool,
    ) -> Self {
        self.entries.push(RarEntry {
            name: name.into(),
            content: content.as_ref().to_vec(),
            bad_crc,
            locked,
        });
        self
    }

    pub fn file(self, name: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.push(name, content, false, false)
    }

    /// Entry whose stored FILE_CRC does not match its data
    pub fn bad_crc_file(self, name: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.push(name, content, true, false)
    }

    /// Entry flagged as password protected
    pub fn locked_file(self, name: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.push(name, content, false, true)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = RAR4_MARKER.to_vec();
        out.extend(rar4_block(RAR4_MAIN_HEAD, 0, &[0u8; 6]));

        for entry in &self.entries {
            let size = u32::try_from(entry.content.len()).unwrap();
            let mut crc = crc32(&entry.content);
            if entry.bad_crc {
                crc ^= 0xdead_beef;
            }
            let name = entry.name.as_bytes();

            let mut body = Vec::new();
            body.extend_from_slice(&size.to_le_bytes()); // PACK_SIZE
            body.extend_from_slice(&size.to_le_bytes()); // UNP_SIZE
            body.push(2); // HOST_OS: Win32
            body.extend_from_slice(&crc.to_le_bytes());
            body.extend_from_slice(&0x4a21_0000u32.to_le_bytes()); // 2017-01-01 00:00
            body.push(29); // UNP_VER
            body.push(RAR4_STORED);
            body.extend_from_slice(&u16::try_from(name.len()).unwrap().to_le_bytes());
            body.extend_from_slice(&0x20u32.to_le_bytes()); // archive attribute
            body.extend_from_slice(name);

            let mut flags = RAR4_LONG_BLOCK;
            if entry.locked {
                flags |= RAR4_PASSWORD;
            }
            out.extend(rar4_block(RAR4_FILE_HEAD, flags, &body));
            out.extend_from_slice(&entry.content);
        }

        out.extend(rar4_block(RAR4_END_HEAD, 0x4000, &[]));
        out
    }
}
