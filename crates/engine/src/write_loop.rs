//! The write loop state machine
//!
//! One dedicated thread runs the loop. It is the only writer to the log
//! store and the only thread that advances last-written.
//!
//! # Iteration
//!
//! 1. Block while paused
//! 2. Give the replication layer a chance to leave recovery
//! 3. Pull a batch, waiting at most `batch_wait`
//! 4. Flip the outbound drain flag if it disagrees with `exhausted`
//! 5. On an empty batch, stop if shutdown was requested, otherwise loop
//! 6. Check the batch is strictly ordered
//! 7. Persist it to every target
//! 8. Check the persisted id is the batch's last id
//! 9. Finalize durability
//! 10. Push the entries to the outbound buffer (may block)
//!
//! # States
//!
//! ```text
//! Running <-> Paused
//!    |
//!    v
//! ShuttingDown -> Stopped
//! ```
//!
//! Any fatal error also ends in `Stopped`.
//!
//! # Shutdown
//!
//! Entries are never lost. A batch interrupted before its log store commit
//! goes back to the head of the inbound buffer. A batch whose log store
//! commit succeeded is finalized and forwarded before the loop exits, past
//! the outbound capacity if shutdown interrupted the push. Once shutdown is
//! requested the loop only pulls as many entries as the outbound buffer has
//! room for; the rest stay in the inbound buffer.

use crate::batcher::{Batch, Batcher};
use crate::config::{FatalPolicy, WriterOptions};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::observer::{NoopObserver, WriteObserver};
use crate::writer::PersistenceAdapter;
use logwriter_concurrency::{BoundedBuffer, OperationContext, PauseSignal, ShutdownSignal};
use logwriter_core::{Entry, Error, Result};
use logwriter_durability::{
    DurabilityCoordinator, FlushTrigger, LocalReplicationState, NoopFlushTrigger,
    ReplicationCoordinator,
};
use logwriter_storage::StorageEngine;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Observable state of the write loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Processing batches
    Running,
    /// Blocked on the pause signal
    Paused,
    /// Shutdown observed, exiting
    ShuttingDown,
    /// The loop has exited
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Running => "running",
            LoopState::Paused => "paused",
            LoopState::ShuttingDown => "shutting down",
            LoopState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// How the loop exited cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown observed on an empty batch
    Shutdown,
    /// Shutdown interrupted a write or the outbound push
    Interrupted,
}

#[derive(Default)]
struct StateCell {
    state: Mutex<Option<LoopState>>,
    changed: Condvar,
}

impl StateCell {
    fn set(&self, next: LoopState) {
        let mut state = self.state.lock();
        if *state != Some(next) {
            tracing::debug!(state = %next, "Write loop state changed");
            *state = Some(next);
            self.changed.notify_all();
        }
    }

    fn get(&self) -> LoopState {
        self.state.lock().unwrap_or(LoopState::Running)
    }

    fn wait_for(&self, wanted: LoopState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state != Some(wanted) {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return *state == Some(wanted);
            }
        }
        true
    }
}

/// Builder for [`WriteLoop`]
pub struct WriteLoopBuilder {
    engine: Arc<dyn StorageEngine>,
    inbound: Arc<BoundedBuffer<Entry>>,
    outbound: Arc<BoundedBuffer<Entry>>,
    options: WriterOptions,
    replication: Option<Arc<dyn ReplicationCoordinator>>,
    flush: Option<Arc<dyn FlushTrigger>>,
    observer: Arc<dyn WriteObserver>,
    metrics: Arc<dyn MetricsSink>,
    shutdown: ShutdownSignal,
    pause: PauseSignal,
}

impl WriteLoopBuilder {
    /// Resolved options
    pub fn options(mut self, options: WriterOptions) -> Self {
        self.options = options;
        self
    }

    /// Replication coordinator to report last-written to
    ///
    /// Defaults to a fresh [`LocalReplicationState`].
    pub fn replication(mut self, replication: Arc<dyn ReplicationCoordinator>) -> Self {
        self.replication = Some(replication);
        self
    }

    /// Journal flush trigger
    ///
    /// Without one, no flush is requested.
    pub fn flush_trigger(mut self, flush: Arc<dyn FlushTrigger>) -> Self {
        self.flush = Some(flush);
        self
    }

    /// Observer called after each target write
    pub fn observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Metrics sink
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Shutdown signal shared with the rest of the process
    pub fn shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Pause signal for tests
    pub fn pause(mut self, pause: PauseSignal) -> Self {
        self.pause = pause;
        self
    }

    /// Build the loop
    pub fn build(self) -> WriteLoop {
        let replication = self
            .replication
            .unwrap_or_else(|| Arc::new(LocalReplicationState::new()));
        let flush_journal =
            self.flush.is_some() && self.options.flush_journal && !self.engine.is_ephemeral();
        let flush = self.flush.unwrap_or_else(|| Arc::new(NoopFlushTrigger));

        register_wakeups(&self.shutdown, &self.inbound, &self.outbound, &self.pause);

        WriteLoop {
            batcher: Batcher::new(
                Arc::clone(&self.inbound),
                self.options.max_batch_entries,
                self.shutdown.clone(),
            ),
            adapter: PersistenceAdapter::new(
                Arc::clone(&self.engine),
                &self.options,
                self.observer,
                self.metrics,
            ),
            durability: DurabilityCoordinator::new(self.engine, Arc::clone(&replication), flush),
            replication,
            outbound: self.outbound,
            flush_journal,
            batch_wait: self.options.batch_wait,
            fatal_policy: self.options.fatal_policy,
            shutdown: self.shutdown,
            pause: self.pause,
            state: Arc::new(StateCell::default()),
        }
    }
}

/// Buffers built with [`BoundedBuffer::with_shutdown`] on the same signal
/// are already registered and are skipped
fn register_wakeups(
    shutdown: &ShutdownSignal,
    inbound: &Arc<BoundedBuffer<Entry>>,
    outbound: &Arc<BoundedBuffer<Entry>>,
    pause: &PauseSignal,
) {
    inbound.wake_on_shutdown(shutdown);
    outbound.wake_on_shutdown(shutdown);
    let pause = pause.clone();
    shutdown.on_request(move || pause.wake());
}

/// The write loop
pub struct WriteLoop {
    batcher: Batcher,
    adapter: PersistenceAdapter,
    durability: DurabilityCoordinator,
    replication: Arc<dyn ReplicationCoordinator>,
    outbound: Arc<BoundedBuffer<Entry>>,
    flush_journal: bool,
    batch_wait: Duration,
    fatal_policy: FatalPolicy,
    shutdown: ShutdownSignal,
    pause: PauseSignal,
    state: Arc<StateCell>,
}

impl WriteLoop {
    /// Start building a loop over `engine` between the two buffers
    pub fn builder(
        engine: Arc<dyn StorageEngine>,
        inbound: Arc<BoundedBuffer<Entry>>,
        outbound: Arc<BoundedBuffer<Entry>>,
    ) -> WriteLoopBuilder {
        WriteLoopBuilder {
            engine,
            inbound,
            outbound,
            options: WriterOptions::default(),
            replication: None,
            flush: None,
            observer: Arc::new(NoopObserver),
            metrics: Arc::new(NoopMetrics),
            shutdown: ShutdownSignal::new(),
            pause: PauseSignal::new(),
        }
    }

    /// Whether a journal flush is requested after each batch
    pub fn flushes_journal(&self) -> bool {
        self.flush_journal
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> Result<WriteLoopHandle> {
        let state = Arc::clone(&self.state);
        let shutdown = self.shutdown.clone();
        let pause = self.pause.clone();
        let fatal_policy = self.fatal_policy;

        let join = thread::Builder::new()
            .name("log-writer".into())
            .spawn(move || {
                let result = self.run();
                if let Err(e) = &result {
                    if fatal_policy == FatalPolicy::Abort {
                        tracing::error!(error = %e, "Fatal error in log writer, aborting process");
                        std::process::abort();
                    }
                }
                result
            })
            .map_err(|e| Error::Internal(format!("failed to spawn write loop: {}", e)))?;

        Ok(WriteLoopHandle {
            state,
            shutdown,
            pause,
            join: Some(join),
        })
    }

    /// Run on the calling thread until shutdown or a fatal error
    pub fn run(self) -> Result<LoopExit> {
        self.state.set(LoopState::Running);
        tracing::info!(
            targets = self.adapter.targets().len(),
            flush_journal = self.flush_journal,
            batch_wait_ms = self.batch_wait.as_millis() as u64,
            "Log writer starting"
        );

        let result = self
            .adapter
            .check_targets()
            .and_then(|()| self.run_loop());

        self.state.set(LoopState::Stopped);
        match &result {
            Ok(exit) => tracing::info!(exit = ?exit, "Log writer stopped"),
            Err(e) => tracing::error!(error = %e, "Log writer stopped on fatal error"),
        }
        result
    }

    fn run_loop(&self) -> Result<LoopExit> {
        let ctx = OperationContext::new("log-writer");
        loop {
            if self.pause.is_paused() {
                self.state.set(LoopState::Paused);
                tracing::info!("Log writer paused");
                self.pause.wait_while_paused(&self.shutdown);
                self.state.set(LoopState::Running);
                tracing::info!("Log writer resumed");
            }

            self.replication.attempt_local_role_transition();

            let batch = if self.shutdown.is_requested() {
                match self.outbound_room() {
                    0 => {
                        tracing::info!(
                            pending = self.batcher.pending(),
                            "Outbound buffer full at shutdown, leaving entries in inbound buffer"
                        );
                        self.state.set(LoopState::ShuttingDown);
                        return Ok(LoopExit::Shutdown);
                    }
                    room => self.batcher.get_next_batch_up_to(self.batch_wait, room),
                }
            } else {
                self.batcher.get_next_batch(self.batch_wait)
            };

            if batch.exhausted() != self.outbound.in_drain_mode() {
                if batch.exhausted() {
                    self.outbound.enter_drain_mode();
                } else {
                    self.outbound.exit_drain_mode();
                }
            }

            if batch.is_empty() {
                if self.shutdown.is_requested() {
                    self.state.set(LoopState::ShuttingDown);
                    return Ok(LoopExit::Shutdown);
                }
                continue;
            }

            if let Some(exit) = self.process(&ctx, batch)? {
                self.state.set(LoopState::ShuttingDown);
                return Ok(exit);
            }
        }
    }

    /// Persist, finalize and forward one non-empty batch
    fn process(&self, ctx: &OperationContext, batch: Batch) -> Result<Option<LoopExit>> {
        let last_id = batch.validate_order()?;
        let last = batch
            .last_id_and_wall_time()
            .ok_or_else(|| Error::Internal("non-empty batch has no last entry".into()))?;

        let persisted = match self.adapter.write_batch(ctx, &batch, &self.shutdown) {
            Ok(persisted) => persisted,
            Err(failure) if failure.error.is_interrupted() => {
                if failure.log_store_committed {
                    tracing::info!(last = %last_id, "Shutdown during change feed write, finalizing committed batch");
                    self.durability.finalize(last, self.flush_journal)?;
                    self.forward(batch);
                } else {
                    self.batcher.requeue(batch);
                }
                return Ok(Some(LoopExit::Interrupted));
            }
            Err(failure) => return Err(failure.error),
        };

        if persisted != last_id {
            return Err(Error::PersistedMismatch {
                expected: last_id,
                persisted,
            });
        }

        self.durability.finalize(last, self.flush_journal)?;

        if !self.forward(batch) {
            return Ok(Some(LoopExit::Interrupted));
        }
        Ok(None)
    }

    /// Entries the outbound buffer takes without blocking
    ///
    /// The loop is the only producer, so the room can only grow until the
    /// next push.
    fn outbound_room(&self) -> usize {
        match self.outbound.len() {
            0 => usize::MAX,
            len => self.outbound.capacity().saturating_sub(len),
        }
    }

    /// Push to the outbound buffer; `false` if shutdown interrupted the push
    ///
    /// An interrupted batch is still appended, past capacity.
    fn forward(&self, batch: Batch) -> bool {
        let entries = batch.into_entries();
        let count = entries.len();
        match self.outbound.push(entries.iter().cloned(), &self.shutdown) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    entries = count,
                    "Shutdown while forwarding, appending committed batch past outbound capacity"
                );
                self.outbound.push_past_capacity(entries);
                false
            }
        }
    }
}

impl fmt::Debug for WriteLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteLoop")
            .field("adapter", &self.adapter)
            .field("flush_journal", &self.flush_journal)
            .field("batch_wait", &self.batch_wait)
            .field("state", &self.state.get())
            .finish()
    }
}

/// Control handle for a spawned [`WriteLoop`]
pub struct WriteLoopHandle {
    state: Arc<StateCell>,
    shutdown: ShutdownSignal,
    pause: PauseSignal,
    join: Option<JoinHandle<Result<LoopExit>>>,
}

impl WriteLoopHandle {
    /// Current loop state
    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    /// Wait until the loop reaches `state`; `false` on timeout
    pub fn wait_for_state(&self, state: LoopState, timeout: Duration) -> bool {
        self.state.wait_for(state, timeout)
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.shutdown.request();
    }

    /// Pause at the top of the next iteration
    pub fn pause(&self) {
        self.pause.pause();
    }

    /// Resume a paused loop
    pub fn resume(&self) {
        self.pause.resume();
    }

    /// Check if the loop thread has exited
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    /// Wait for the loop thread to exit
    pub fn join(mut self) -> Result<LoopExit> {
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| Error::Internal("write loop thread panicked".into()))?,
            None => Err(Error::Internal("write loop already joined".into())),
        }
    }
}

impl fmt::Debug for WriteLoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteLoopHandle")
            .field("state", &self.state())
            .field("shutdown", &self.shutdown)
            .finish()
    }
}
