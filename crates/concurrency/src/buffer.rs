//! Capacity-bounded blocking FIFO with drain mode
//!
//! Two instances sit on either side of the write loop: the inbound buffer
//! holds entries waiting to be persisted, the outbound buffer holds
//! persisted entries waiting for the downstream consumer.
//!
//! ## Blocking
//!
//! - `pop_batch` waits up to a caller-supplied bound for data
//! - `push` waits without a bound while the buffer is too full; this is the
//!   back-pressure that throttles a writer behind a slow consumer
//!
//! Both waits return [`Interrupted`] as soon as shutdown is requested and
//! never remove or add entries when they do.
//!
//! ## Drain mode
//!
//! Drain mode is only an observable flag. It tells the consumer that no
//! more input is expected right now and it should flush what it holds.
//! Push and pop behave identically in both modes.

use crate::signal::ShutdownSignal;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A blocking buffer wait was ended by shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("buffer wait interrupted at shutdown")]
pub struct Interrupted;

impl From<Interrupted> for logwriter_core::Error {
    fn from(_: Interrupted) -> Self {
        logwriter_core::Error::InterruptedAtShutdown
    }
}

/// Result of one [`BoundedBuffer::pop_batch`] call
#[derive(Debug)]
pub struct Popped<T> {
    /// Items removed, in FIFO order
    pub items: Vec<T>,
    /// Whether the buffer was empty right after the pull
    pub exhausted: bool,
}

struct BufferState<T> {
    queue: VecDeque<T>,
    drain_mode: bool,
    drain_transitions: u64,
    total_pushed: u64,
    total_popped: u64,
}

/// Capacity-bounded FIFO shared between one producer and one consumer
///
/// Capacity is counted in items. A run of items is pushed atomically: it
/// is admitted when it fits, or when the buffer is empty so that a run
/// larger than the capacity cannot wedge the producer forever.
pub struct BoundedBuffer<T> {
    name: String,
    capacity: usize,
    state: Mutex<BufferState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    wakes_on_shutdown: AtomicBool,
}

impl<T> BoundedBuffer<T> {
    /// Create a buffer
    ///
    /// A capacity of zero is treated as one.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            state: Mutex::new(BufferState {
                queue: VecDeque::new(),
                drain_mode: false,
                drain_transitions: 0,
                total_pushed: 0,
                total_popped: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            wakes_on_shutdown: AtomicBool::new(false),
        }
    }

    /// Create a buffer whose waiters are woken when `shutdown` is requested
    pub fn with_shutdown(
        name: impl Into<String>,
        capacity: usize,
        shutdown: &ShutdownSignal,
    ) -> Arc<Self>
    where
        T: Send + 'static,
    {
        let buffer = Arc::new(Self::new(name, capacity));
        buffer.wake_on_shutdown(shutdown);
        buffer
    }

    /// Wake this buffer's waiters when `shutdown` is requested
    ///
    /// Only the first call registers a listener; later calls are no-ops.
    /// Returns whether this call registered it.
    pub fn wake_on_shutdown(self: &Arc<Self>, shutdown: &ShutdownSignal) -> bool
    where
        T: Send + 'static,
    {
        if self.wakes_on_shutdown.swap(true, Ordering::SeqCst) {
            return false;
        }
        let weak = Arc::downgrade(self);
        shutdown.on_request(move || {
            if let Some(buffer) = weak.upgrade() {
                buffer.wake_all();
            }
        });
        true
    }

    /// Buffer name, used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of items held before `push` blocks
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered items
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Check if the buffer holds no items
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Total items ever pushed
    pub fn total_pushed(&self) -> u64 {
        self.state.lock().total_pushed
    }

    /// Total items ever popped
    pub fn total_popped(&self) -> u64 {
        self.state.lock().total_popped
    }

    /// Append a run of items in order, blocking while there is no room
    ///
    /// Returns [`Interrupted`] without adding anything if shutdown is
    /// requested while waiting.
    pub fn push<I>(&self, items: I, shutdown: &ShutdownSignal) -> Result<(), Interrupted>
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();
        while !state.queue.is_empty() && state.queue.len() + items.len() > self.capacity {
            if shutdown.is_requested() {
                return Err(Interrupted);
            }
            tracing::trace!(buffer = %self.name, pending = items.len(), "Buffer full, waiting");
            self.not_full.wait(&mut state);
        }

        state.total_pushed += items.len() as u64;
        state.queue.extend(items);
        self.not_empty.notify_all();
        Ok(())
    }

    /// Append a run of items without waiting for room
    ///
    /// The buffer may end up above capacity. Reserved for items that are
    /// already durable and must reach the consumer after `push` was
    /// interrupted by shutdown.
    pub fn push_past_capacity(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.total_pushed += items.len() as u64;
        state.queue.extend(items);
        self.not_empty.notify_all();
    }

    /// Remove up to `max_items`, waiting up to `max_wait` for the first one
    ///
    /// Returns an empty [`Popped`] if nothing arrived in time. The
    /// `exhausted` flag reports whether the buffer was empty right after
    /// the pull, whether or not anything was returned.
    pub fn pop_batch(
        &self,
        max_wait: Duration,
        max_items: usize,
        shutdown: &ShutdownSignal,
    ) -> Result<Popped<T>, Interrupted> {
        let deadline = Instant::now() + max_wait;
        let mut state = self.state.lock();
        while state.queue.is_empty() {
            if shutdown.is_requested() {
                return Err(Interrupted);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        let take = state.queue.len().min(max_items.max(1));
        let items: Vec<T> = state.queue.drain(..take).collect();
        state.total_popped += items.len() as u64;
        let exhausted = state.queue.is_empty();
        if !items.is_empty() {
            self.not_full.notify_all();
        }
        Ok(Popped { items, exhausted })
    }

    /// Put previously popped items back at the head, preserving their order
    ///
    /// Never blocks; the items held room in the buffer before they were
    /// popped. Used when a consumer is interrupted before acting on a pull.
    pub fn requeue_front(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.total_popped = state.total_popped.saturating_sub(items.len() as u64);
        for item in items.into_iter().rev() {
            state.queue.push_front(item);
        }
        self.not_empty.notify_all();
    }

    /// Remove the oldest item without waiting
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.queue.pop_front();
        if item.is_some() {
            state.total_popped += 1;
            self.not_full.notify_all();
        }
        item
    }

    /// Wait until data is available or drain mode is on
    ///
    /// Returns `true` if data is available. Consumers use this to decide
    /// between applying more input and flushing what they hold.
    pub fn wait_for_data_or_drain(
        &self,
        max_wait: Duration,
        shutdown: &ShutdownSignal,
    ) -> Result<bool, Interrupted> {
        let deadline = Instant::now() + max_wait;
        let mut state = self.state.lock();
        while state.queue.is_empty() && !state.drain_mode {
            if shutdown.is_requested() {
                return Err(Interrupted);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        Ok(!state.queue.is_empty())
    }

    /// Switch drain mode on
    pub fn enter_drain_mode(&self) {
        self.set_drain_mode(true);
    }

    /// Switch drain mode off
    pub fn exit_drain_mode(&self) {
        self.set_drain_mode(false);
    }

    /// Current drain mode flag
    pub fn in_drain_mode(&self) -> bool {
        self.state.lock().drain_mode
    }

    /// Number of times the drain flag actually changed
    pub fn drain_transitions(&self) -> u64 {
        self.state.lock().drain_transitions
    }

    /// Wake every waiter so it can re-check shutdown
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn set_drain_mode(&self, on: bool) {
        let mut state = self.state.lock();
        if state.drain_mode == on {
            return;
        }
        state.drain_mode = on;
        state.drain_transitions += 1;
        tracing::debug!(buffer = %self.name, drain_mode = on, "Drain mode changed");
        self.not_empty.notify_all();
    }
}

impl<T> fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedBuffer")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &state.queue.len())
            .field("drain_mode", &state.drain_mode)
            .finish()
    }
}
