//! Ordering and drain mode

use crate::common::*;
use logwriter::engine::{LoopExit, WriterOptions};
use logwriter::prelude::{ReplicationCoordinator, StorageEngine};
use logwriter::types::{EntryId, Timestamp};
use proptest::prelude::*;
use std::thread;

#[test]
fn three_entries_persisted_finalized_and_forwarded_in_order() {
    let h = Harness::new();
    let input = entries(1, 3);
    h.push(input.clone());

    let handle = h.spawn(test_options());
    let forwarded = h.take_outbound(3);

    assert_eq!(ids(&forwarded), ids(&input));
    assert_eq!(ids(&h.log_store()), ids(&input));
    assert_eq!(
        h.replication.last_written().id,
        EntryId::new(Timestamp::new(100, 3), 1)
    );
    assert_eq!(h.engine.visible_position(), Timestamp::new(100, 3));
    assert_eq!(*h.flush.seen.lock(), vec![EntryId::new(Timestamp::new(100, 3), 1)]);

    handle.shutdown();
    assert_eq!(handle.join().unwrap(), LoopExit::Shutdown);
    assert!(h.outbound.in_drain_mode());
    assert_eq!(h.outbound.drain_transitions(), 1);
}

#[test]
fn drain_mode_toggles_once_per_change() {
    let h = Harness::new();
    let options = WriterOptions {
        max_batch_entries: 2,
        ..test_options()
    };
    // [1,2] [3,4] not exhausted, [5] exhausted
    h.push(entries(1, 5));
    let handle = h.spawn(options);
    h.take_outbound(5);
    assert_eq!(h.outbound.drain_transitions(), 1);
    assert!(h.outbound.in_drain_mode());

    // [6,7] not exhausted leaves drain mode, [8] re-enters
    h.push(entries(6, 3));
    h.take_outbound(3);
    wait_until(|| h.outbound.drain_transitions() == 3);
    assert!(h.outbound.in_drain_mode());

    handle.shutdown();
    handle.join().unwrap();
    assert_eq!(h.outbound.drain_transitions(), 3);
}

#[test]
fn newer_term_sorts_after_larger_timestamp() {
    let h = Harness::new();
    let mut input = entries_in_term(50, 2, 1);
    input.extend(entries_in_term(1, 2, 2));
    h.push(input.clone());

    let handle = h.spawn(test_options());
    assert_eq!(ids(&h.take_outbound(4)), ids(&input));
    assert_eq!(h.replication.last_written().id.term, 2);

    handle.shutdown();
    handle.join().unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn batches_are_persisted_and_forwarded_in_append_order(
        chunks in proptest::collection::vec(1u32..20, 1..12),
        max_batch in 1usize..16,
    ) {
        let h = Harness::new();
        let handle = h.spawn(WriterOptions {
            max_batch_entries: max_batch,
            ..test_options()
        });

        let mut input = Vec::new();
        let mut next = 1;
        for n in &chunks {
            input.extend(entries(next, *n));
            next += n;
        }
        let total = input.len();

        let producer = {
            let inbound = h.inbound.clone();
            let shutdown = h.shutdown.clone();
            let chunks = chunks.clone();
            let input = input.clone();
            thread::spawn(move || {
                let mut offset = 0;
                for n in chunks {
                    let end = offset + n as usize;
                    inbound.push(input[offset..end].to_vec(), &shutdown).unwrap();
                    offset = end;
                }
            })
        };

        let forwarded = h.take_outbound(total);
        producer.join().unwrap();
        handle.shutdown();
        handle.join().unwrap();

        prop_assert_eq!(ids(&forwarded), ids(&input));
        prop_assert_eq!(ids(&h.log_store()), ids(&input));
    }
}
