//! Shutdown behaviour

use crate::common::*;
use logwriter::engine::{LoopExit, LoopState, WriterOptions};
use logwriter::prelude::*;
use logwriter::storage::StorageError;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn shutdown_with_empty_inbound_exits_cleanly() {
    let h = Harness::new();
    let handle = h.spawn(test_options());
    assert!(handle.wait_for_state(LoopState::Running, WAIT));

    handle.shutdown();
    assert_eq!(handle.join().unwrap(), LoopExit::Shutdown);
    assert!(h.log_store().is_empty());
}

#[test]
fn shutdown_interrupts_a_long_batch_wait_promptly() {
    let h = Harness::new();
    let handle = h.spawn(WriterOptions {
        batch_wait: Duration::from_secs(60),
        ..test_options()
    });
    assert!(handle.wait_for_state(LoopState::Running, WAIT));
    std::thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    handle.shutdown();
    assert_eq!(handle.join().unwrap(), LoopExit::Shutdown);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn batch_interrupted_before_commit_stays_in_inbound() {
    let h = Harness::new();
    h.engine
        .inject_failures(TargetKind::LogStore, vec![StorageError::WriteConflict; 3]);
    h.shutdown.request();
    h.push(entries(1, 4));

    // Shutdown during the first backoff ends the write
    let exit = h.spawn(test_options()).join().unwrap();
    assert_eq!(exit, LoopExit::Interrupted);
    assert_eq!(ids(&h.inbound.try_pop().into_iter().collect::<Vec<_>>()), ids(&entries(1, 1)));
    assert_eq!(h.inbound.len(), 3);
    assert!(h.log_store().is_empty());
    assert!(h.outbound.is_empty());
}

#[test]
fn close_persists_everything_already_appended() {
    let engine = Arc::new(InMemoryEngine::new());
    let writer = LogWriter::builder(engine.clone())
        .config(WriterConfig {
            batch_wait_ms: 20,
            fatal_policy: FatalPolicy::Propagate,
            ..WriterConfig::default()
        })
        .paused()
        .start()
        .unwrap();
    assert!(writer.wait_for_state(LoopState::Paused, WAIT));

    writer.append(entries(1, 10)).unwrap();
    writer.resume();
    assert_eq!(writer.close().unwrap(), LoopExit::Shutdown);

    assert_eq!(ids(&engine.entries(TargetKind::LogStore)), ids(&entries(1, 10)));
}

#[test]
fn shutdown_does_not_split_a_range_written_one_entry_at_a_time() {
    let h = Harness::with_engine(
        InMemoryEngine::builder().max_transaction_entries(1).build(),
        1024,
    );
    h.engine.inject_failure_at(
        TargetKind::LogStore,
        entries(2, 1)[0].id(),
        StorageError::LockTimeout,
    );
    h.push(entries(1, 3));
    h.shutdown.request();

    assert_eq!(h.spawn(test_options()).join().unwrap(), LoopExit::Shutdown);
    assert_eq!(ids(&h.log_store()), ids(&entries(1, 3)));
    assert!(h.inbound.is_empty());
    assert_eq!(ids(&h.take_outbound(3)), ids(&entries(1, 3)));
    assert_eq!(h.replication.last_written().id, entries(3, 1)[0].id());

    // A restarted loop finds nothing left to re-insert
    h.push(entries(4, 1));
    assert_eq!(h.spawn(test_options()).join().unwrap(), LoopExit::Shutdown);
    assert_eq!(ids(&h.log_store()), ids(&entries(1, 4)));
}
