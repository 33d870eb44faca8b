//! Transient and fatal failures

use crate::common::*;
use logwriter::engine::WriterOptions;
use logwriter::prelude::*;
use logwriter::storage::StorageError;

fn with_change_feed() -> WriterOptions {
    WriterOptions {
        write_change_feed: true,
        ..test_options()
    }
}

#[test]
fn change_feed_transient_failures_are_retried_without_rewriting_log_store() {
    let h = Harness::new();
    h.engine.inject_failures(
        TargetKind::ChangeFeed,
        vec![StorageError::WriteConflict, StorageError::LockTimeout],
    );
    h.push(entries(1, 3));

    let handle = h.spawn(with_change_feed());
    let forwarded = h.take_outbound(3);
    handle.shutdown();
    handle.join().unwrap();

    assert_eq!(ids(&forwarded), ids(&entries(1, 3)));
    assert_eq!(h.engine.commit_count(TargetKind::LogStore), 1);
    assert_eq!(h.engine.commit_count(TargetKind::ChangeFeed), 1);
    assert_eq!(ids(&h.change_feed()), ids(&h.log_store()));
    assert_eq!(h.engine.pending_failures(TargetKind::ChangeFeed), 0);
}

#[test]
fn exhausted_change_feed_retries_stop_the_loop() {
    let h = Harness::new();
    h.engine
        .inject_failures(TargetKind::ChangeFeed, vec![StorageError::WriteConflict; 3]);
    h.push(entries(1, 2));

    let err = h.spawn(with_change_feed()).join().unwrap_err();
    match err {
        Error::RetriesExhausted { target, attempts, .. } => {
            assert_eq!(target, "config.changes");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected {:?}", other),
    }
    // Log store committed, nothing finalized or forwarded
    assert_eq!(h.log_store().len(), 2);
    assert!(h.replication.last_written().id.is_null());
    assert!(h.outbound.is_empty());
}

#[test]
fn missing_change_feed_is_fatal_at_startup() {
    let h = Harness::with_engine(
        InMemoryEngine::builder()
            .without_target(TargetKind::ChangeFeed)
            .build(),
        64,
    );
    h.push(entries(1, 2));

    let err = h.spawn(with_change_feed()).join().unwrap_err();
    assert!(matches!(err, Error::MissingTarget(ref ns) if ns == "config.changes"));
    assert!(h.log_store().is_empty());
    assert_eq!(h.inbound.len(), 2);
}

#[test]
fn regression_across_batches_is_fatal() {
    let h = Harness::new();
    let handle = h.spawn(test_options());
    h.push(entries(5, 1));
    h.take_outbound(1);

    h.push(entries(3, 1));
    let err = handle.join().unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(h.log_store().len(), 1);
    assert!(h.outbound.is_empty());
}

#[test]
fn observer_sees_each_target_after_commit() {
    let h = Harness::new();
    h.push(entries(1, 2));
    let handle = h.spawn(with_change_feed());
    h.take_outbound(2);
    handle.shutdown();
    handle.join().unwrap();

    let calls = h.observer.calls.lock().clone();
    let expected = ids(&entries(1, 2));
    assert_eq!(
        calls,
        vec![
            (TargetKind::LogStore, expected.clone()),
            (TargetKind::ChangeFeed, expected),
        ]
    );
}

#[test]
fn skipped_log_store_writes_still_finalize_and_forward() {
    let h = Harness::new();
    h.push(entries(1, 2));
    let handle = h.spawn(WriterOptions {
        skip_log_store_writes: true,
        ..with_change_feed()
    });
    h.take_outbound(2);
    handle.shutdown();
    handle.join().unwrap();

    assert!(h.log_store().is_empty());
    assert_eq!(h.change_feed().len(), 2);
    assert_eq!(h.replication.last_written().id, entries(2, 1)[0].id());
}
