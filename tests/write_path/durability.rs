//! Watermarks, visibility and journal flushes

use crate::common::*;
use logwriter::durability::ReplicationCoordinator;
use logwriter::engine::WriterOptions;
use logwriter::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn last_written_never_decreases_while_writing() {
    let h = Harness::new();
    let handle = h.spawn(WriterOptions {
        max_batch_entries: 3,
        ..test_options()
    });

    let done = Arc::new(AtomicBool::new(false));
    let sampler = {
        let replication = h.replication.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut samples = Vec::new();
            while !done.load(Ordering::SeqCst) {
                samples.push(replication.last_written().id);
            }
            samples
        })
    };

    for chunk in 0..20 {
        h.push(entries(chunk * 5 + 1, 5));
    }
    h.take_outbound(100);
    done.store(true, Ordering::SeqCst);

    let samples = sampler.join().unwrap();
    assert!(samples.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(
        h.replication.last_written().id,
        EntryId::new(Timestamp::new(100, 100), 1)
    );

    handle.shutdown();
    handle.join().unwrap();
}

#[test]
fn flush_is_requested_after_watermark_moves() {
    let h = Harness::new();
    let handle = h.spawn(WriterOptions {
        max_batch_entries: 2,
        ..test_options()
    });

    h.push(entries(1, 6));
    h.take_outbound(6);
    handle.shutdown();
    handle.join().unwrap();

    // One request per batch, each seeing that batch's last id
    let seen = h.flush.seen.lock().clone();
    let expected: Vec<EntryId> = [2, 4, 6]
        .iter()
        .map(|&i| EntryId::new(Timestamp::new(100, i), 1))
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn no_flush_requested_for_ephemeral_engine() {
    let h = Harness::with_engine(InMemoryEngine::builder().ephemeral().build(), 64);
    let handle = h.spawn(test_options());
    h.push(entries(1, 3));
    h.take_outbound(3);
    handle.shutdown();
    handle.join().unwrap();

    assert!(h.flush.seen.lock().is_empty());
    assert_eq!(h.replication.last_written().id, entries(3, 1)[0].id());
}

#[test]
fn log_writer_advances_last_durable_through_journal() {
    let engine = Arc::new(InMemoryEngine::new());
    let writer = LogWriter::builder(engine.clone())
        .config(WriterConfig {
            batch_wait_ms: 20,
            fatal_policy: FatalPolicy::Propagate,
            ..WriterConfig::default()
        })
        .start()
        .unwrap();

    writer.append(entries(1, 4)).unwrap();
    wait_until(|| writer.outbound().len() == 4);
    let last = entries(4, 1)[0].id();
    wait_until(|| writer.replication().last_durable().id == last);
    assert_eq!(writer.report().batch_size, 4);

    assert_eq!(writer.close().unwrap(), LoopExit::Shutdown);
    assert!(engine.journal_flushes() >= 1);
}

#[test]
fn log_writer_recovers_watermarks_from_existing_log_store() {
    let engine = Arc::new(InMemoryEngine::new());
    {
        let writer = LogWriter::builder(engine.clone())
            .config(WriterConfig {
                batch_wait_ms: 20,
                fatal_policy: FatalPolicy::Propagate,
                ..WriterConfig::default()
            })
            .start()
            .unwrap();
        writer.append(entries(1, 3)).unwrap();
        writer.close().unwrap();
    }

    let writer = LogWriter::builder(engine.clone())
        .config(WriterConfig {
            batch_wait_ms: 20,
            fatal_policy: FatalPolicy::Propagate,
            ..WriterConfig::default()
        })
        .start()
        .unwrap();
    let recovered = writer.replication().last_written().id;
    assert_eq!(recovered, entries(3, 1)[0].id());
    assert_eq!(writer.replication().last_durable().id, recovered);

    writer.append(entries(4, 2)).unwrap();
    writer.close().unwrap();
    assert_eq!(engine.entries(TargetKind::LogStore).len(), 5);
}
