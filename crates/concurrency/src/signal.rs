//! Shutdown and pause signals
//!
//! [`ShutdownSignal`] is the only cancellation primitive of the write path.
//! Requesting shutdown flips a flag and runs every registered listener, so
//! threads parked inside a buffer wait are woken immediately instead of
//! waiting out their timeout.
//!
//! [`PauseSignal`] is an externally settable flag the write loop checks
//! once per iteration. It exists so tests can freeze replication at a
//! known point.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Listener = Box<dyn Fn() + Send + Sync>;

struct ShutdownInner {
    requested: AtomicBool,
    listeners: Mutex<Vec<Listener>>,
    // Used only by `sleep` so backoff waits end as soon as shutdown starts
    sleep_lock: Mutex<()>,
    sleep_cv: Condvar,
}

/// Process shutdown flag with wake-up listeners
///
/// Cloning is cheap; all clones observe the same flag.
///
/// # Example
///
/// ```
/// use logwriter_concurrency::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// assert!(!shutdown.is_requested());
/// shutdown.request();
/// assert!(shutdown.is_requested());
/// ```
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<ShutdownInner>,
}

impl ShutdownSignal {
    /// Create a signal that has not been requested
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownInner {
                requested: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                sleep_lock: Mutex::new(()),
                sleep_cv: Condvar::new(),
            }),
        }
    }

    /// Request shutdown and wake every registered listener
    ///
    /// Only the first call runs the listeners.
    pub fn request(&self) {
        if self.inner.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutdown requested");
        {
            let _guard = self.inner.sleep_lock.lock();
            self.inner.sleep_cv.notify_all();
        }
        let listeners = self.inner.listeners.lock();
        for listener in listeners.iter() {
            listener();
        }
    }

    /// Check whether shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Register a callback to run when shutdown is requested
    ///
    /// If shutdown was already requested the callback runs immediately on
    /// the calling thread.
    pub fn on_request(&self, listener: impl Fn() + Send + Sync + 'static) {
        let mut listeners = self.inner.listeners.lock();
        if self.is_requested() {
            drop(listeners);
            listener();
            return;
        }
        listeners.push(Box::new(listener));
    }

    /// Sleep for `duration` unless shutdown is requested first
    ///
    /// Returns `true` if the sleep was cut short by shutdown.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.sleep_lock.lock();
        while !self.is_requested() {
            if self
                .inner
                .sleep_cv
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                break;
            }
        }
        self.is_requested()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("requested", &self.is_requested())
            .finish()
    }
}

/// Externally settable pause flag
#[derive(Clone, Default)]
pub struct PauseSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl PauseSignal {
    /// Create an unpaused signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pause flag
    pub fn pause(&self) {
        let (lock, _) = &*self.inner;
        *lock.lock() = true;
    }

    /// Clear the pause flag and wake the paused thread
    pub fn resume(&self) {
        let (lock, cv) = &*self.inner;
        *lock.lock() = false;
        cv.notify_all();
    }

    /// Check the pause flag
    pub fn is_paused(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Wake waiters without changing the flag
    ///
    /// Registered as a shutdown listener so a paused loop can observe
    /// shutdown.
    pub fn wake(&self) {
        let (lock, cv) = &*self.inner;
        let _guard = lock.lock();
        cv.notify_all();
    }

    /// Block while the flag is set
    ///
    /// Returns `false` if shutdown was requested while paused. Only the
    /// signal's own lock is held while waiting.
    pub fn wait_while_paused(&self, shutdown: &ShutdownSignal) -> bool {
        let (lock, cv) = &*self.inner;
        let mut paused = lock.lock();
        while *paused {
            if shutdown.is_requested() {
                return false;
            }
            cv.wait(&mut paused);
        }
        true
    }
}

impl fmt::Debug for PauseSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PauseSignal")
            .field("paused", &self.is_paused())
            .finish()
    }
}
