//! Configuration loaded from TOML

use crate::common::*;
use logwriter::prelude::*;
use std::io::Write;
use std::sync::Arc;

#[test]
fn config_file_enables_change_feed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
batch_wait_ms = 20
write_change_feed = true
fatal_policy = "propagate"

[retry]
max_attempts = 2
initial_backoff_ms = 1
max_backoff_ms = 2
"#
    )
    .unwrap();

    let engine = Arc::new(InMemoryEngine::new());
    let writer = LogWriter::builder(engine.clone())
        .config_file(file.path())
        .unwrap()
        .start()
        .unwrap();
    assert!(writer.options().write_change_feed);
    assert_eq!(writer.options().retry.max_attempts, 2);

    writer.append(entries(1, 3)).unwrap();
    wait_until(|| writer.outbound().len() == 3);
    writer.close().unwrap();

    assert_eq!(engine.entries(TargetKind::ChangeFeed).len(), 3);
}

#[test]
fn invalid_config_is_rejected_before_start() {
    let err = LogWriter::builder(Arc::new(InMemoryEngine::new()))
        .config(WriterConfig {
            batch_wait_ms: 0,
            ..WriterConfig::default()
        })
        .start()
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn report_json_counts_entries_and_batches() {
    let writer = LogWriter::builder(Arc::new(InMemoryEngine::new()))
        .config(WriterConfig {
            batch_wait_ms: 20,
            fatal_policy: FatalPolicy::Propagate,
            ..WriterConfig::default()
        })
        .start()
        .unwrap();
    writer.append(entries(1, 5)).unwrap();
    wait_until(|| writer.outbound().len() == 5);

    let report = writer.report_json().unwrap();
    assert_eq!(report["batchSize"], 5);
    assert!(report["batches"]["num"].as_u64().unwrap() >= 1);
    writer.close().unwrap();
}
