//! Back-pressure from a full outbound buffer

use crate::common::*;
use logwriter::engine::{LoopExit, WriterOptions};
use logwriter::prelude::*;
use std::thread;
use std::time::Duration;

fn two_per_batch() -> WriterOptions {
    WriterOptions {
        max_batch_entries: 2,
        ..test_options()
    }
}

#[test]
fn full_outbound_blocks_the_loop_without_dropping_entries() {
    let h = Harness::with_engine(InMemoryEngine::new(), 2);
    h.push(entries(1, 6));
    let handle = h.spawn(two_per_batch());

    // First batch fills the outbound buffer, second is persisted and blocks
    wait_until(|| h.log_store().len() == 4);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(h.log_store().len(), 4);
    assert_eq!(h.outbound.len(), 2);
    assert_eq!(h.inbound.len(), 2);

    let forwarded = h.take_outbound(6);
    assert_eq!(ids(&forwarded), ids(&entries(1, 6)));
    assert_eq!(h.log_store().len(), 6);

    handle.shutdown();
    assert_eq!(handle.join().unwrap(), LoopExit::Shutdown);
}

#[test]
fn shutdown_while_blocked_on_outbound_keeps_entries_durable() {
    let h = Harness::with_engine(InMemoryEngine::new(), 2);
    h.push(entries(1, 4));
    let handle = h.spawn(two_per_batch());
    wait_until(|| h.log_store().len() == 4);

    handle.shutdown();
    assert_eq!(handle.join().unwrap(), LoopExit::Interrupted);

    // The blocked batch is durable, visible and still reaches the consumer
    assert_eq!(h.replication.last_written().id, entries(4, 1)[0].id());
    assert_eq!(h.engine.visible_position(), Timestamp::new(100, 4));
    assert_eq!(h.outbound.len(), 4);
    assert_eq!(ids(&h.take_outbound(4)), ids(&entries(1, 4)));
}

#[test]
fn shutdown_with_full_outbound_keeps_unpulled_entries_in_inbound() {
    let h = Harness::with_engine(InMemoryEngine::new(), 1);
    h.outbound.push(entries(1, 1), &h.shutdown).unwrap();
    h.push(entries(2, 3));
    h.shutdown.request();

    assert_eq!(h.spawn(test_options()).join().unwrap(), LoopExit::Shutdown);
    assert!(h.log_store().is_empty());
    assert_eq!(h.inbound.len(), 3);
    assert_eq!(h.outbound.len(), 1);
}
