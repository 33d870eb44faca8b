//! Shared fixtures for write path tests

#![allow(dead_code)]

use logwriter::concurrency::{BoundedBuffer, PauseSignal, ShutdownSignal};
use logwriter::durability::{FlushTrigger, LocalReplicationState, ReplicationCoordinator};
use logwriter::engine::{FatalPolicy, WriteLoop, WriteLoopHandle, WriteObserver, WriterOptions};
use logwriter::storage::{InMemoryEngine, RetryPolicy, TargetKind};
use logwriter::types::{Entry, EntryId, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(10);

/// Entries with ids (100, from) .. (100, from + n) in one term
pub fn entries(from: u32, n: u32) -> Vec<Entry> {
    entries_in_term(from, n, 1)
}

pub fn entries_in_term(from: u32, n: u32, term: i64) -> Vec<Entry> {
    (from..from + n)
        .map(|i| Entry::now(Timestamp::new(100, i), term, format!("op-{}", i).into_bytes()))
        .collect()
}

pub fn ids(entries: &[Entry]) -> Vec<EntryId> {
    entries.iter().map(Entry::id).collect()
}

/// Options suited to tests: short waits, fast retries, errors propagate
pub fn test_options() -> WriterOptions {
    WriterOptions {
        batch_wait: Duration::from_millis(20),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        },
        fatal_policy: FatalPolicy::Propagate,
        ..WriterOptions::default()
    }
}

/// Records the last-written id seen at every flush request
#[derive(Default)]
pub struct RecordingFlush {
    replication: Mutex<Option<Arc<LocalReplicationState>>>,
    pub seen: Mutex<Vec<EntryId>>,
}

impl FlushTrigger for RecordingFlush {
    fn request_flush(&self) {
        let last = self
            .replication
            .lock()
            .as_ref()
            .map(|r| r.last_written().id)
            .unwrap_or(EntryId::NULL);
        self.seen.lock().push(last);
    }
}

/// Records every observer call
#[derive(Default)]
pub struct RecordingObserver {
    pub calls: Mutex<Vec<(TargetKind, Vec<EntryId>)>>,
}

impl WriteObserver for RecordingObserver {
    fn on_write_log_store(&self, entries: &[Entry]) {
        self.calls.lock().push((TargetKind::LogStore, ids(entries)));
    }

    fn on_write_change_feed(&self, entries: &[Entry]) {
        self.calls.lock().push((TargetKind::ChangeFeed, ids(entries)));
    }
}

pub struct Harness {
    pub engine: Arc<InMemoryEngine>,
    pub inbound: Arc<BoundedBuffer<Entry>>,
    pub outbound: Arc<BoundedBuffer<Entry>>,
    pub shutdown: ShutdownSignal,
    pub pause: PauseSignal,
    pub replication: Arc<LocalReplicationState>,
    pub flush: Arc<RecordingFlush>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_engine(InMemoryEngine::new(), 1024)
    }

    pub fn with_engine(engine: InMemoryEngine, outbound_capacity: usize) -> Self {
        let shutdown = ShutdownSignal::new();
        let replication = Arc::new(LocalReplicationState::new());
        let flush = Arc::new(RecordingFlush::default());
        *flush.replication.lock() = Some(replication.clone());
        Self {
            engine: Arc::new(engine),
            inbound: BoundedBuffer::with_shutdown("inbound", 1024, &shutdown),
            outbound: BoundedBuffer::with_shutdown("outbound", outbound_capacity, &shutdown),
            shutdown,
            pause: PauseSignal::new(),
            replication,
            flush,
            observer: Arc::new(RecordingObserver::default()),
        }
    }

    pub fn spawn(&self, options: WriterOptions) -> WriteLoopHandle {
        WriteLoop::builder(
            self.engine.clone(),
            self.inbound.clone(),
            self.outbound.clone(),
        )
        .options(options)
        .replication(self.replication.clone())
        .flush_trigger(self.flush.clone())
        .observer(self.observer.clone())
        .shutdown(self.shutdown.clone())
        .pause(self.pause.clone())
        .build()
        .spawn()
        .unwrap()
    }

    pub fn push(&self, entries: Vec<Entry>) {
        self.inbound.push(entries, &self.shutdown).unwrap();
    }

    /// Pop from the outbound buffer until `n` entries were collected
    pub fn take_outbound(&self, n: usize) -> Vec<Entry> {
        let deadline = Instant::now() + WAIT;
        let mut out = Vec::new();
        while out.len() < n {
            assert!(Instant::now() < deadline, "timed out with {} of {} entries", out.len(), n);
            let popped = self
                .outbound
                .pop_batch(Duration::from_millis(20), n - out.len(), &ShutdownSignal::new())
                .unwrap();
            out.extend(popped.items);
        }
        out
    }

    /// Wait until the outbound buffer holds `n` entries without taking them
    pub fn wait_outbound_len(&self, n: usize) {
        wait_until(|| self.outbound.len() >= n);
    }

    pub fn log_store(&self) -> Vec<Entry> {
        self.engine.entries(TargetKind::LogStore)
    }

    pub fn change_feed(&self) -> Vec<Entry> {
        self.engine.entries(TargetKind::ChangeFeed)
    }
}

/// Poll `condition` until it holds or the wait bound passes
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}
