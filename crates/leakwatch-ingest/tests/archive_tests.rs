//! Archive extraction integration tests
//!
//! Archives are built in memory with the `zip`, `tar`, `flate2` and `bzip2`
//! writers. RAR fixtures are hand-assembled RAR 4.x stored archives.

mod helpers;

use helpers::{corrupt_entry, mark_zip_encrypted, TarFixture, ZipFixture};
use leakwatch_ingest::archive::{ArchiveExtractor, DecodePolicy};
use leakwatch_ingest::ArchiveError;

#[test]
fn test_zip_entries_extracted_in_order() {
    let raw = ZipFixture::new()
        .dir("dump/")
        .file("dump/a.txt", "alice@example.com:hunter2\n")
        .file("dump/b.json", r#"[{"email":"bob@test.com"}]"#)
        .build();

    let files = ArchiveExtractor::default().extract(&raw, "leak.zip").unwrap();

    let names: Vec<&str> = files.iter().map(|f| f.inner_filename.as_str()).collect();
    assert_eq!(names, vec!["dump/a.txt", "dump/b.json"]);
    assert_eq!(files[0].content, "alice@example.com:hunter2\n");
}

#[test]
fn test_corrupt_entry_does_not_hide_siblings() {
    helpers::init_tracing();
    let raw = ZipFixture::new()
        .file("broken.txt", "CORRUPTED-PAYLOAD-CORRUPTED-PAYLOAD")
        .file("good.txt", "alice@example.com:hunter2")
        .build();
    let raw = corrupt_entry(raw, b"CORRUPTED-PAYLOAD-CORRUPTED-PAYLOAD");

    let files = ArchiveExtractor::default().extract(&raw, "leak.zip").unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].inner_filename, "good.txt");
    assert_eq!(files[0].content, "alice@example.com:hunter2");
}

#[test]
fn test_garbage_is_unreadable_not_panic() {
    let extractor = ArchiveExtractor::default();
    for name in ["leak.zip", "leak.tar.gz", "leak.tar.bz2"] {
        let err = extractor.extract(b"definitely not an archive", name).unwrap_err();
        assert!(matches!(err, ArchiveError::Unreadable { .. }), "{name}: {err}");
    }
}

#[test]
fn test_invalid_utf8_is_policy_driven() {
    let raw = ZipFixture::new()
        .file("latin1.txt", b"j\xF6rg@example.de:pa\xDFword".as_slice())
        .build();

    let replaced = ArchiveExtractor::new(DecodePolicy::Replace)
        .extract(&raw, "x.zip")
        .unwrap();
    assert_eq!(replaced[0].content, "j\u{FFFD}rg@example.de:pa\u{FFFD}word");

    let ignored = ArchiveExtractor::new(DecodePolicy::Ignore)
        .extract(&raw, "x.zip")
        .unwrap();
    assert_eq!(ignored[0].content, "jrg@example.de:paword");
}

#[test]
fn test_oversized_entry_skipped() {
    let raw = ZipFixture::new()
        .file("huge.txt", vec![b'a'; 4096])
        .file("small.txt", "a@b.c:d")
        .build();

    let files = ArchiveExtractor::default()
        .with_max_entry_bytes(1024)
        .extract(&raw, "x.zip")
        .unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].inner_filename, "small.txt");
}

#[test]
fn test_tar_variants() {
    let tar = TarFixture::new()
        .file("combo.txt", "alice@example.com:hunter2")
        .file("info.csv", "bob@test.com;secret;US");
    let extractor = ArchiveExtractor::default();

    let plain = extractor.extract(&tar.build(), "dump.tar").unwrap();
    assert_eq!(plain.len(), 2);

    let gz = extractor.extract(&tar.build_gz(), "DUMP.TAR.GZ").unwrap();
    assert_eq!(gz.len(), 2);
    assert_eq!(gz[1].inner_filename, "info.csv");
    assert_eq!(gz[1].content, "bob@test.com;secret;US");
}

#[test]
fn test_tar_bz2_extracts() {
    let raw = TarFixture::new()
        .file("combo.txt", "alice@example.com:hunter2")
        .file("more.txt", "bob@test.com:secret")
        .build_bz2();

    for name in ["dump.tar.bz2", "dump.tbz2"] {
        let files = ArchiveExtractor::default().extract(&raw, name).unwrap();
        assert_eq!(files.len(), 2, "{name}");
        assert_eq!(files[1].content, "bob@test.com:secret");
    }
}

#[test]
fn test_all_encrypted_zip_is_password_protected() {
    let raw = ZipFixture::new()
        .file("a.txt", "alice@example.com:hunter2")
        .file("b.txt", "bob@test.com:secret")
        .build();
    let raw = mark_zip_encrypted(raw);

    let err = ArchiveExtractor::default().extract(&raw, "locked.zip").unwrap_err();
    assert!(matches!(err, ArchiveError::PasswordProtected { format: "zip" }), "{err}");
}

#[cfg(feature = "rar")]
mod rar {
    use super::*;
    use helpers::RarFixture;

    #[test]
    fn test_rar_entries_extracted() {
        let raw = RarFixture::new()
            .file("combo.txt", "alice@example.com:hunter2\n")
            .file("info.csv", "bob@test.com;secret;US")
            .build();

        let files = ArchiveExtractor::default().extract(&raw, "LEAK.RAR").unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.inner_filename.as_str()).collect();
        assert_eq!(names, vec!["combo.txt", "info.csv"]);
        assert_eq!(files[1].content, "bob@test.com;secret;US");
    }

    #[test]
    fn test_rar_corrupt_first_entry_keeps_siblings() {
        helpers::init_tracing();
        let raw = RarFixture::new()
            .bad_crc_file("bad.txt", "carol@site.org:lost")
            .file("good.txt", "alice@example.com:hunter2")
            .bad_crc_file("worse.txt", "dave@site.org:lost")
            .file("last.txt", "bob@test.com:secret")
            .build();

        let files = ArchiveExtractor::default().extract(&raw, "mixed.rar").unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.inner_filename.as_str()).collect();
        assert_eq!(names, vec!["good.txt", "last.txt"]);
        assert_eq!(files[0].content, "alice@example.com:hunter2");
    }

    #[test]
    fn test_rar_only_locked_entries_is_password_protected() {
        let raw = RarFixture::new()
            .locked_file("secret.txt", "alice@example.com:hunter2")
            .build();

        let err = ArchiveExtractor::default().extract(&raw, "locked.rar").unwrap_err();
        assert!(matches!(err, ArchiveError::PasswordProtected { format: "rar" }), "{err}");
    }

    #[test]
    fn test_rar_locked_entry_skipped_beside_readable_one() {
        let raw = RarFixture::new()
            .locked_file("secret.txt", "alice@example.com:hunter2")
            .file("open.txt", "bob@test.com:secret")
            .build();

        let files = ArchiveExtractor::default().extract(&raw, "half.rar").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].inner_filename, "open.txt");
    }

    #[test]
    fn test_rar_without_readable_entry_is_unreadable() {
        let raw = RarFixture::new().bad_crc_file("bad.txt", "x@y.z:1").build();

        let err = ArchiveExtractor::default().extract(&raw, "bad.rar").unwrap_err();
        assert!(matches!(err, ArchiveError::Unreadable { format: "rar", .. }), "{err}");
    }

    #[test]
    fn test_rar_garbage_is_unreadable() {
        let err = ArchiveExtractor::default()
            .extract(b"definitely not an archive", "leak.rar")
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Unreadable { .. }), "{err}");
    }

    #[test]
    fn test_rar_oversized_entry_skipped() {
        let raw = RarFixture::new()
            .file("huge.txt", vec![b'a'; 4096])
            .file("small.txt", "a@b.c:d")
            .build();

        let files = ArchiveExtractor::default()
            .with_max_entry_bytes(1024)
            .extract(&raw, "x.rar")
            .unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].inner_filename, "small.txt");
    }
}

#[cfg(feature = "sevenz")]
#[test]
fn test_sevenz_entries_extracted() {
    let src = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("combo.txt"), "alice@example.com:hunter2").unwrap();
    std::fs::write(src.path().join("info.csv"), "bob@test.com;secret;US").unwrap();
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("dump.7z");
    sevenz_rust::compress_to_path(src.path(), &dest).unwrap();
    let raw = std::fs::read(&dest).unwrap();

    let mut files = ArchiveExtractor::default().extract(&raw, "dump.7z").unwrap();
    files.sort_by(|a, b| a.inner_filename.cmp(&b.inner_filename));

    let names: Vec<&str> = files.iter().map(|f| f.inner_filename.as_str()).collect();
    assert_eq!(names, vec!["combo.txt", "info.csv"]);
    assert_eq!(files[0].content, "alice@example.com:hunter2");
}

#[test]
fn test_uppercase_extension_dispatches() {
    let raw = ZipFixture::new().file("a.txt", "x@y.z:1").build();
    let files = ArchiveExtractor::default().extract(&raw, "LEAK.ZIP").unwrap();
    assert_eq!(files.len(), 1);
}
