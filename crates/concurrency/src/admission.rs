//! Admission control and per-operation context
//!
//! Ordinary storage work acquires a ticket from the shared
//! [`AdmissionController`] before it may run. Log writes are on the
//! critical durability path: if they queued behind ordinary traffic the
//! inbound buffer would grow without bound and replication would stall.
//! The write path therefore marks its writes [`AdmissionPriority::Exempt`]
//! for exactly the duration of each write with a
//! [`ScopedAdmissionPriority`] guard.
//!
//! [`UnreplicatedWritesBlock`] is the second scoped guard applied to log
//! writes: the rows being inserted *are* the log, so they must not be
//! logged again.
//!
//! Both guards restore the previous setting when dropped, on every exit
//! path.

use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Scheduling class recognized by the admission controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdmissionPriority {
    /// Background work, admitted like normal work
    Low,
    /// Ordinary traffic
    Normal,
    /// Critical-path work that never waits for a ticket
    Exempt,
}

impl AdmissionPriority {
    /// Check if this priority bypasses ticket acquisition
    pub fn is_exempt(&self) -> bool {
        matches!(self, AdmissionPriority::Exempt)
    }
}

/// State attached to the thread performing an operation
///
/// An `OperationContext` is owned by one thread and passed by reference
/// into every storage call so the engine can see the caller's priority and
/// whether its writes should be re-logged.
#[derive(Debug)]
pub struct OperationContext {
    name: String,
    priority: Cell<AdmissionPriority>,
    writes_replicated: Cell<bool>,
}

impl OperationContext {
    /// Create a context with normal priority and replicated writes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: Cell::new(AdmissionPriority::Normal),
            writes_replicated: Cell::new(true),
        }
    }

    /// Name of the owning operation, used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current admission priority
    pub fn priority(&self) -> AdmissionPriority {
        self.priority.get()
    }

    /// Whether writes made under this context are logged for replication
    pub fn writes_are_replicated(&self) -> bool {
        self.writes_replicated.get()
    }
}

/// Guard that sets a context's priority for its lifetime
///
/// ```
/// use logwriter_concurrency::{AdmissionPriority, OperationContext, ScopedAdmissionPriority};
///
/// let ctx = OperationContext::new("writer");
/// {
///     let _priority = ScopedAdmissionPriority::new(&ctx, AdmissionPriority::Exempt);
///     assert_eq!(ctx.priority(), AdmissionPriority::Exempt);
/// }
/// assert_eq!(ctx.priority(), AdmissionPriority::Normal);
/// ```
#[must_use = "the priority is restored as soon as the guard is dropped"]
pub struct ScopedAdmissionPriority<'a> {
    ctx: &'a OperationContext,
    previous: AdmissionPriority,
}

impl<'a> ScopedAdmissionPriority<'a> {
    /// Set `priority` on `ctx` until the guard is dropped
    pub fn new(ctx: &'a OperationContext, priority: AdmissionPriority) -> Self {
        let previous = ctx.priority.replace(priority);
        Self { ctx, previous }
    }
}

impl Drop for ScopedAdmissionPriority<'_> {
    fn drop(&mut self) {
        self.ctx.priority.set(self.previous);
    }
}

/// Guard that turns off write re-logging for its lifetime
#[must_use = "replication is re-enabled as soon as the guard is dropped"]
pub struct UnreplicatedWritesBlock<'a> {
    ctx: &'a OperationContext,
    previous: bool,
}

impl<'a> UnreplicatedWritesBlock<'a> {
    /// Disable re-logging on `ctx` until the guard is dropped
    pub fn new(ctx: &'a OperationContext) -> Self {
        let previous = ctx.writes_replicated.replace(false);
        Self { ctx, previous }
    }
}

impl Drop for UnreplicatedWritesBlock<'_> {
    fn drop(&mut self) {
        self.ctx.writes_replicated.set(self.previous);
    }
}

/// Admission failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// No ticket became free within the timeout
    #[error("no admission ticket available within {0:?}")]
    Timeout(Duration),
}

struct TicketPool {
    capacity: usize,
    available: Mutex<usize>,
    released: Condvar,
    exempt_admissions: AtomicU64,
    ticketed_admissions: AtomicU64,
}

/// Shared ticket pool limiting concurrent storage work
#[derive(Clone)]
pub struct AdmissionController {
    pool: Arc<TicketPool>,
}

impl AdmissionController {
    /// Create a pool with `tickets` concurrent admissions
    pub fn new(tickets: usize) -> Self {
        Self {
            pool: Arc::new(TicketPool {
                capacity: tickets,
                available: Mutex::new(tickets),
                released: Condvar::new(),
                exempt_admissions: AtomicU64::new(0),
                ticketed_admissions: AtomicU64::new(0),
            }),
        }
    }

    /// Admit the operation owning `ctx`
    ///
    /// Exempt contexts are admitted immediately without consuming a ticket.
    /// Everything else waits up to `timeout` for a free ticket.
    pub fn acquire(
        &self,
        ctx: &OperationContext,
        timeout: Duration,
    ) -> Result<Ticket, AdmissionError> {
        if ctx.priority().is_exempt() {
            self.pool.exempt_admissions.fetch_add(1, Ordering::Relaxed);
            return Ok(Ticket { pool: None });
        }

        let deadline = Instant::now() + timeout;
        let mut available = self.pool.available.lock();
        while *available == 0 {
            if self
                .pool
                .released
                .wait_until(&mut available, deadline)
                .timed_out()
                && *available == 0
            {
                tracing::debug!(op = ctx.name(), ?timeout, "Admission ticket wait timed out");
                return Err(AdmissionError::Timeout(timeout));
            }
        }
        *available -= 1;
        self.pool.ticketed_admissions.fetch_add(1, Ordering::Relaxed);
        Ok(Ticket {
            pool: Some(Arc::clone(&self.pool)),
        })
    }

    /// Total tickets in the pool
    pub fn capacity(&self) -> usize {
        self.pool.capacity
    }

    /// Tickets currently free
    pub fn available(&self) -> usize {
        *self.pool.available.lock()
    }

    /// Admissions granted without a ticket
    pub fn exempt_admissions(&self) -> u64 {
        self.pool.exempt_admissions.load(Ordering::Relaxed)
    }

    /// Admissions that consumed a ticket
    pub fn ticketed_admissions(&self) -> u64 {
        self.pool.ticketed_admissions.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// Admission held by an operation; released on drop
#[must_use = "the admission is released as soon as the ticket is dropped"]
#[derive(Debug)]
pub struct Ticket {
    pool: Option<Arc<TicketPool>>,
}

impl Ticket {
    /// Whether this admission bypassed the pool
    pub fn is_exempt(&self) -> bool {
        self.pool.is_none()
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            *pool.available.lock() += 1;
            pool.released.notify_one();
        }
    }
}

impl std::fmt::Debug for TicketPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketPool")
            .field("capacity", &self.capacity)
            .finish()
    }
}
