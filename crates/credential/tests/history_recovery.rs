//! Crash recovery and tamper detection for the history file

use rotator_credential::history::{FailureReason, HistoryError, HistoryStore, RotationRecord, Trigger};
use rotator_credential::testing::fixed_time;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn failure(minute: i64) -> RotationRecord {
    RotationRecord::failure(
        Trigger::Scheduled,
        fixed_time() + chrono::Duration::minutes(minute),
        FailureReason::TransientNetwork,
        "connection reset",
        Duration::from_millis(120),
    )
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

#[test]
fn test_partial_frame_is_truncated_on_open() {
    // GIVEN: Two durable records and a crash halfway through a third
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.log");
    {
        let store = HistoryStore::open(&path, 10).unwrap();
        store.append(failure(0)).unwrap();
        store.append(failure(1)).unwrap();
    }
    let clean_len = std::fs::metadata(&path).unwrap().len();
    append_raw(&path, &[0, 0, 0, 90, 1, 2, 3]);

    // WHEN: The store is reopened
    let store = HistoryStore::open(&path, 10).unwrap();

    // THEN: The torn bytes are gone and appends continue the chain
    assert_eq!(store.len(), 2);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), clean_len);
    store.append(failure(2)).unwrap();
    drop(store);
    assert_eq!(HistoryStore::open(&path, 10).unwrap().len(), 3);
}

#[test]
fn test_read_only_open_ignores_torn_tail_without_writing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.log");
    {
        let store = HistoryStore::open(&path, 10).unwrap();
        store.append(failure(0)).unwrap();
    }
    append_raw(&path, &[0, 0]);
    let torn_len = std::fs::metadata(&path).unwrap().len();

    let store = HistoryStore::open_read_only(&path, 10).unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), torn_len);
    assert!(matches!(store.append(failure(1)), Err(HistoryError::ReadOnly)));
}

#[test]
fn test_edited_record_breaks_the_chain() {
    // GIVEN: A history whose first record was edited in place
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.log");
    {
        let store = HistoryStore::open(&path, 10).unwrap();
        store.append(failure(0)).unwrap();
        store.append(failure(1)).unwrap();
    }
    let mut bytes = std::fs::read(&path).unwrap();
    let needle = b"connection reset";
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap();
    bytes[at] = b'C';
    std::fs::write(&path, &bytes).unwrap();

    // WHEN/THEN: Opening reports which record is broken
    let err = HistoryStore::open(&path, 10).unwrap_err();
    assert!(matches!(err, HistoryError::Integrity { index: 0, .. }), "{err}");
}

#[test]
fn test_compacted_history_still_verifies() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.log");
    {
        let store = HistoryStore::open(&path, 3).unwrap();
        for minute in 0..7 {
            store.append(failure(minute)).unwrap();
        }
        assert_eq!(store.len(), 3);
    }

    let store = HistoryStore::open(&path, 3).unwrap();

    let timestamps: Vec<_> = store.records().iter().map(|r| r.timestamp).collect();
    assert_eq!(
        timestamps,
        (4..7)
            .map(|m| fixed_time() + chrono::Duration::minutes(m))
            .collect::<Vec<_>>()
    );
}
