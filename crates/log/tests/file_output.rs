//! End-to-end: JSON events land in the configured log file.
//!
//! Installing a global subscriber is once per process, so this binary holds a
//! single test.
#![cfg(feature = "file")]

use rotator_log::{Config, DisplayConfig, Format, LogError, Rolling, WriterConfig};

#[test]
fn test_json_events_written_to_file() {
    // GIVEN: A JSON logger writing to a file in a temp dir
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rotator.log");
    let config = Config {
        level: "info,file_output=debug".to_string(),
        format: Format::Json,
        writer: WriterConfig::File {
            path: path.clone(),
            rolling: Rolling::Never,
        },
        display: DisplayConfig {
            colors: false,
            ..DisplayConfig::default()
        },
    };
    let guard = rotator_log::init_with(config).unwrap();

    // WHEN: Events are emitted and the guard flushes
    tracing::debug!(account = "rotator-test", "rotation scheduled");
    tracing::trace!("filtered out");
    assert!(matches!(
        rotator_log::init_with(Config::default()),
        Err(LogError::Init(_))
    ));
    drop(guard);

    // THEN: One JSON object per accepted event, fields flattened
    let contents = std::fs::read_to_string(&path).unwrap();
    let events: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let scheduled = events
        .iter()
        .find(|e| e["message"] == "rotation scheduled")
        .expect("event missing from log file");
    assert_eq!(scheduled["account"], "rotator-test");
    assert_eq!(scheduled["level"], "DEBUG");
    assert!(!contents.contains("filtered out"));
}
