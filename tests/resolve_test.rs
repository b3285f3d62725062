//! Tests for input resolution: archives, manifests, single files, filters.

mod helpers;

use floodgate::FloodgateError;
use floodgate::config::HandlerConfig;
use floodgate::file::FileType;
use floodgate::resolve::{FileFilter, resolve_input};

use crate::helpers::{make_zip, utf8, write_file};

/// Creates incoming and scratch directories inside a fresh temp tree.
fn setup() -> (tempfile::TempDir, camino::Utf8PathBuf, camino::Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let incoming = utf8(dir.path().join("incoming"));
    let scratch = utf8(dir.path().join("scratch"));
    std::fs::create_dir_all(&incoming).unwrap();
    std::fs::create_dir_all(&scratch).unwrap();
    (dir, incoming, scratch)
}

#[test]
fn test_single_file_copied_into_scratch() {
    let (_dir, incoming, scratch) = setup();
    let input = write_file(&incoming, "good.nc", b"CDF\x01headerdata");

    let collection = resolve_input(&input, &scratch, &FileFilter::default()).unwrap();

    assert_eq!(collection.len(), 1);
    let file = collection.iter().next().unwrap();
    assert_eq!(file.local_path(), scratch.join("good.nc"));
    assert_eq!(file.source_path(), input);
    assert_eq!(file.file_type(), FileType::NetCdf);
    assert_eq!(file.size(), Some(14));
    assert!(file.checksum().is_some());
    assert!(file.local_path().is_file());
}

#[test]
fn test_zip_expanded_with_entries_in_order() {
    let (_dir, incoming, scratch) = setup();
    let input = incoming.join("pair.zip");
    make_zip(&input, &[("a.nc", b"CDF\x01aaa"), ("sub/b.nc", b"CDF\x01bbb")]);

    let collection = resolve_input(&input, &scratch, &FileFilter::default()).unwrap();

    assert_eq!(collection.len(), 2);
    let order: Vec<_> = collection.iter().map(|f| f.source_path().as_str()).collect();
    assert_eq!(order, ["a.nc", "sub/b.nc"]);
    assert!(scratch.join("a.nc").is_file());
    assert!(scratch.join("sub/b.nc").is_file());
}

#[test]
fn test_empty_zip_resolves_to_empty_collection() {
    let (_dir, incoming, scratch) = setup();
    let input = incoming.join("empty.zip");
    make_zip(&input, &[]);

    let collection = resolve_input(&input, &scratch, &FileFilter::default()).unwrap();
    assert!(collection.is_empty());
}

#[test]
fn test_zip_entry_with_parent_segment_rejected() {
    let (_dir, incoming, scratch) = setup();
    let input = incoming.join("evil.zip");
    make_zip(&input, &[("../escape.nc", b"CDF\x01data")]);

    let err = resolve_input(&input, &scratch, &FileFilter::default()).unwrap_err();
    assert!(matches!(err, FloodgateError::Resolve(_)));
    assert!(err.to_string().contains(".."));
    assert!(!incoming.join("escape.nc").exists());
}

#[test]
fn test_zip_detected_by_magic_without_extension() {
    let (_dir, incoming, scratch) = setup();
    let named_zip = incoming.join("upload.zip");
    make_zip(&named_zip, &[("a.csv", b"h\n1\n")]);
    let input = incoming.join("upload.bin");
    std::fs::rename(&named_zip, &input).unwrap();

    let collection = resolve_input(&input, &scratch, &FileFilter::default()).unwrap();
    assert_eq!(collection.len(), 1);
    assert_eq!(collection.iter().next().unwrap().source_path(), "a.csv");
}

#[test]
fn test_manifest_entries_added_in_place() {
    let (_dir, incoming, scratch) = setup();
    let data_a = write_file(&incoming, "a.csv", b"h\n1\n");
    let data_b = write_file(&incoming, "b.csv", b"h\n2\n");
    let input = write_file(
        &incoming,
        "batch.manifest",
        format!("# batch of two\n{}\n\n{}\n", data_a, data_b).as_bytes(),
    );

    let collection = resolve_input(&input, &scratch, &FileFilter::default()).unwrap();

    assert_eq!(collection.len(), 2);
    let first = collection.iter().next().unwrap();
    assert_eq!(first.local_path(), data_a);
    assert_eq!(first.source_path(), data_a);
    // No copy: scratch stays empty for manifests.
    assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
}

#[test]
fn test_manifest_missing_entry_is_resolve_failure() {
    let (_dir, incoming, scratch) = setup();
    let input = write_file(&incoming, "batch.manifest", b"/nonexistent/entry.csv\n");

    let err = resolve_input(&input, &scratch, &FileFilter::default()).unwrap_err();
    assert!(matches!(err, FloodgateError::Resolve(_)));
    assert_eq!(err.kind(), "resolve_failure");
}

#[test]
fn test_filter_excludes_manifest_entry_without_materialising() {
    let (_dir, incoming, scratch) = setup();
    let keep = write_file(&incoming, "keep.csv", b"h\n1\n");
    write_file(&incoming, "skip.csv", b"h\n2\n");
    let input = write_file(
        &incoming,
        "batch.manifest",
        format!("{}\n{}\n", keep, incoming.join("skip.csv")).as_bytes(),
    );
    let config = HandlerConfig {
        exclude: Some("skip".to_string()),
        ..Default::default()
    };
    let filter = FileFilter::from_handler(&config).unwrap();

    let collection = resolve_input(&input, &scratch, &filter).unwrap();

    assert_eq!(collection.len(), 1);
    assert_eq!(collection.iter().next().unwrap().local_path(), keep);
}

#[test]
fn test_filter_excludes_zip_entry_before_extraction() {
    let (_dir, incoming, scratch) = setup();
    let input = incoming.join("mixed.zip");
    make_zip(&input, &[("keep.nc", b"CDF\x01a"), ("notes.txt", b"hello")]);
    let config = HandlerConfig {
        include: Some(r"\.nc$".to_string()),
        ..Default::default()
    };
    let filter = FileFilter::from_handler(&config).unwrap();

    let collection = resolve_input(&input, &scratch, &filter).unwrap();

    assert_eq!(collection.len(), 1);
    assert!(scratch.join("keep.nc").is_file());
    assert!(!scratch.join("notes.txt").exists());
}

#[test]
fn test_manifest_duplicate_entry_rejected() {
    let (_dir, incoming, scratch) = setup();
    let data = write_file(&incoming, "a.csv", b"h\n1\n");
    let input = write_file(
        &incoming,
        "batch.manifest",
        format!("{}\n{}\n", data, data).as_bytes(),
    );

    let err = resolve_input(&input, &scratch, &FileFilter::default()).unwrap_err();
    assert!(matches!(err, FloodgateError::DuplicateFile(_)));
}

#[test]
fn test_directory_input_is_invalid() {
    let (_dir, incoming, scratch) = setup();
    let err = resolve_input(&incoming, &scratch, &FileFilter::default()).unwrap_err();
    assert!(matches!(err, FloodgateError::InvalidInput(_)));
}

#[test]
fn test_missing_input_is_io_error() {
    let (_dir, incoming, scratch) = setup();
    let err =
        resolve_input(&incoming.join("absent.nc"), &scratch, &FileFilter::default()).unwrap_err();
    assert!(matches!(err, FloodgateError::Io { .. }));
}
