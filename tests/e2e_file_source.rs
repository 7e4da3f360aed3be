//! E2E tests for the delimited file source
//!
//! Covers header handling, delimiter detection, line accounting and the
//! error path for unreadable files.

use sampleflow::source::file::load_file;
use sampleflow::source::FileOptions;
use sampleflow::{FileSource, Source, SourceError, SourceEvent, SourceState};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Test the reference x,y file loads into two fields of three points
#[test]
fn test_xy_file_loads() {
    let file = write_temp("x,y\n1,10\n2,20\n3,30\n");
    let mut source = FileSource::new();
    source.initialize(file.path().to_str().unwrap()).unwrap();
    source.start().unwrap();

    let store = source.store();
    assert_eq!(store.field_names(), ["x", "y"]);
    assert_eq!(store.len(), 3);
    assert_eq!(store.series("x"), [1.0, 2.0, 3.0]);
    assert_eq!(store.series("y"), [10.0, 20.0, 30.0]);
    assert_eq!(source.state(), SourceState::Running);
}

/// Test that every data line is counted as either valid or skipped
#[test]
fn test_line_accounting() {
    let file = write_temp("# exported by logger\nt;v\n0;1\n1;abc\n# gap\n2;3\n\n3;;4\n4;5;6\nbad\n");
    let (store, counters) = load_file(file.path()).unwrap();

    assert_eq!(counters.total_lines, 6);
    assert_eq!(counters.valid_lines + counters.skipped_lines, counters.total_lines);
    assert_eq!(counters.skipped_lines, 2);
    assert_eq!(counters.comment_lines, 2);

    // `3;;4` drops the empty token; `4;5;6` adds a third column
    assert_eq!(store.field_names(), ["t", "v", "Column_3"]);
    assert_eq!(store.series("t"), [0.0, 2.0, 3.0, 4.0]);
    assert_eq!(store.series("v"), [1.0, 3.0, 4.0, 5.0]);
    let third = store.series("Column_3");
    assert!(third[..3].iter().all(|v| v.is_nan()));
    assert_eq!(third[3], 6.0);
    assert!(store.is_valid());
}

/// Test tab detection without a header row
#[test]
fn test_tab_file_without_header() {
    let file = write_temp("1.5\t2.5\n3.5\t4.5\n");
    let mut source = FileSource::with_options(FileOptions {
        path: file.path().to_path_buf(),
        has_header: false,
        ..FileOptions::default()
    });
    source.start().unwrap();

    assert_eq!(source.store().field_names(), ["Column_1", "Column_2"]);
    assert_eq!(source.data(), vec![1.5, 3.5]);
    assert!(!source.has_new_data());
}

/// Test payload options: skip lines and an explicit pipe delimiter
#[test]
fn test_payload_options() {
    let file = write_temp("garbage line\nanother\na|b\n1|2\n");
    let payload = format!("path={};delimiter=pipe;skip=2", file.path().display());
    let mut source = FileSource::new();
    source.initialize(&payload).unwrap();
    source.start().unwrap();

    assert_eq!(source.store().series("b"), [2.0]);
    assert_eq!(source.counters().total_lines, 1);
}

/// Test that a missing file reports an I/O error through the channel
#[test]
fn test_missing_file_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FileSource::with_path(dir.path().join("absent.csv"));
    let events = source.subscribe();

    let err = source.start().unwrap_err();
    assert!(matches!(err, SourceError::Io { .. }));
    assert_eq!(source.state(), SourceState::Error);

    match events.recv_timeout(Duration::from_secs(1)).unwrap() {
        SourceEvent::Error(message) => assert!(message.contains("absent.csv")),
        other => panic!("unexpected event: {:?}", other),
    }
}

/// Test that an empty path is rejected before touching the filesystem
#[test]
fn test_empty_path_rejected() {
    let mut source = FileSource::new();
    assert!(matches!(source.start(), Err(SourceError::EmptyPath)));
}

/// Test that a successful load fires exactly one data-ready notification
#[test]
fn test_single_data_ready_event() {
    let file = write_temp("a\n1\n2\n");
    let mut source = FileSource::with_path(file.path());
    let events = source.subscribe();
    source.start().unwrap();

    assert!(matches!(events.try_recv(), Ok(SourceEvent::DataReady)));
    assert!(events.try_recv().is_err());
}

/// Test that a subset starting at 1 is shifted by one and independent
#[test]
fn test_subset_shift_and_independence() {
    let file = write_temp("x,y\n1,10\n2,20\n3,30\n4,40\n");
    let (store, _) = load_file(file.path()).unwrap();

    let mut subset = store.subset(1, store.len());
    assert_eq!(subset.len(), store.len() - 1);
    for name in store.field_names() {
        assert_eq!(subset.series(name), &store.series(name)[1..]);
    }

    subset.add_series("x", vec![0.0; 3]);
    assert_eq!(store.series("x"), [1.0, 2.0, 3.0, 4.0]);
}

/// Test that stop clears the loaded data
#[test]
fn test_stop_clears_store() {
    let file = write_temp("x\n1\n");
    let mut source = FileSource::with_path(file.path());
    source.start().unwrap();
    source.stop();

    assert_eq!(source.state(), SourceState::Stopped);
    assert!(source.store().is_empty());
    assert_eq!(source.counters().total_lines, 0);
}

/// Test that an invalid UTF-8 byte only costs the line it sits on
#[test]
fn test_invalid_utf8_bytes_keep_the_rest_of_the_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"x,y\n1,2\n# caf\xe9\n3,4\n").unwrap();

    let (store, counters) = load_file(file.path()).unwrap();
    assert_eq!(store.field_names(), ["x", "y"]);
    assert_eq!(store.len(), 2);
    assert_eq!(store.series("y"), [2.0, 4.0]);
    assert_eq!(counters.comment_lines, 1);
    assert_eq!(counters.skipped_lines, 0);
}
