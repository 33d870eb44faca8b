//! Asynchronous journal flush
//!
//! The write loop triggers a flush after each batch and moves on. A single
//! background thread coalesces triggers: however many arrive while a flush
//! is running, one more flush follows it. Each flush reads last-written
//! before flushing, so last-durable only ever advances to an entry that was
//! committed before the flush started.

use crate::replication::ReplicationCoordinator;
use logwriter_concurrency::ShutdownSignal;
use logwriter_core::{Error, Result};
use logwriter_storage::StorageEngine;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Non-blocking journal flush request
pub trait FlushTrigger: Send + Sync {
    /// Ask for a flush; returns immediately
    fn request_flush(&self);
}

/// Trigger for engines without a journal
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFlushTrigger;

impl FlushTrigger for NoopFlushTrigger {
    fn request_flush(&self) {}
}

#[derive(Default)]
struct FlushState {
    requested: bool,
    in_flight: bool,
    stop: bool,
}

struct Shared {
    state: Mutex<FlushState>,
    changed: Condvar,
    requests: AtomicU64,
    flushes: AtomicU64,
    failures: AtomicU64,
}

impl Shared {
    fn stop(&self) {
        self.state.lock().stop = true;
        self.changed.notify_all();
    }
}

/// Background journal flusher
pub struct JournalFlusher {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JournalFlusher {
    /// Start the flusher thread
    ///
    /// The thread exits once `shutdown` is requested, after finishing any
    /// flush already requested.
    pub fn spawn(
        engine: Arc<dyn StorageEngine>,
        replication: Arc<dyn ReplicationCoordinator>,
        shutdown: &ShutdownSignal,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(FlushState::default()),
            changed: Condvar::new(),
            requests: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("journal-flusher".into())
            .spawn(move || {
                tracing::debug!("Journal flusher started");
                flush_main(&worker, engine.as_ref(), replication.as_ref());
                tracing::debug!("Journal flusher exiting");
            })
            .map_err(|e| Error::Internal(format!("failed to spawn journal flusher: {}", e)))?;

        let weak = Arc::downgrade(&shared);
        shutdown.on_request(move || {
            if let Some(shared) = weak.upgrade() {
                shared.stop();
            }
        });

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Number of flush requests received
    pub fn requests(&self) -> u64 {
        self.shared.requests.load(Ordering::SeqCst)
    }

    /// Number of flushes completed successfully
    pub fn flushes(&self) -> u64 {
        self.shared.flushes.load(Ordering::SeqCst)
    }

    /// Number of flushes that failed
    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::SeqCst)
    }

    /// Wait until no flush is requested or running
    ///
    /// Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.requested || state.in_flight {
            if self
                .shared
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return !(state.requested || state.in_flight);
            }
        }
        true
    }

    /// Stop the thread and wait for it to exit
    pub fn shutdown(&self) {
        self.shared.stop();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Journal flusher thread panicked");
            }
        }
    }
}

impl FlushTrigger for JournalFlusher {
    fn request_flush(&self) {
        self.shared.requests.fetch_add(1, Ordering::SeqCst);
        let mut state = self.shared.state.lock();
        if !state.stop {
            state.requested = true;
            self.shared.changed.notify_all();
        }
    }
}

impl Drop for JournalFlusher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for JournalFlusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalFlusher")
            .field("requests", &self.requests())
            .field("flushes", &self.flushes())
            .field("failures", &self.failures())
            .finish()
    }
}

fn flush_main(shared: &Shared, engine: &dyn StorageEngine, replication: &dyn ReplicationCoordinator) {
    loop {
        {
            let mut state = shared.state.lock();
            while !state.requested && !state.stop {
                shared.changed.wait(&mut state);
            }
            if !state.requested {
                return;
            }
            state.requested = false;
            state.in_flight = true;
        }

        let target = replication.last_written();
        match engine.flush_journal() {
            Ok(()) => {
                replication.set_my_last_durable_forward(target);
                shared.flushes.fetch_add(1, Ordering::SeqCst);
                tracing::trace!(last_durable = %target.id, "Journal flushed");
            }
            Err(e) => {
                shared.failures.fetch_add(1, Ordering::SeqCst);
                tracing::error!(error = %e, "Journal flush failed");
            }
        }

        shared.state.lock().in_flight = false;
        shared.changed.notify_all();
    }
}
