//! Retry of transient storage failures
//!
//! [`insert_batch_with_retry`] writes a whole batch range to one target:
//!
//! 1. Write the full range in one transaction, retrying transient errors
//!    with exponential backoff and jitter up to `max_attempts`
//! 2. If the engine rejects the range as too large, write one entry per
//!    transaction in order, each retried independently
//! 3. Anything else, including an exhausted retry budget, is returned to
//!    the caller as a fatal [`Error`]
//!
//! A shutdown request during a backoff sleep ends the retry with
//! [`Error::InterruptedAtShutdown`], as long as nothing of the range is
//! committed yet. Once the per-entry fallback has committed its first
//! entry, the rest of the range is written regardless of shutdown so the
//! caller never sees a partially committed range reported as interrupted.

use crate::engine::StorageEngine;
use crate::error::StorageError;
use crate::target::WriteTarget;
use logwriter_concurrency::{OperationContext, ShutdownSignal};
use logwriter_core::{Entry, Error, Result};
use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound on any single backoff
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Backoff to sleep after failed attempt number `attempt` (1-based)
    ///
    /// Doubles from `initial_backoff`, capped at `max_backoff`, with up to
    /// 50% random jitter subtracted so concurrent retriers spread out.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff);
        let base_micros = base.as_micros() as u64;
        if base_micros < 2 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=base_micros / 2);
        Duration::from_micros(base_micros - jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // Default: 10 attempts, 10ms doubling to at most 1s
        RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

enum RetryFailure {
    Exhausted { attempts: u32, last: StorageError },
    Failed(StorageError),
}

/// Write `entries` to `target`, retrying transient failures
pub fn insert_batch_with_retry(
    ctx: &OperationContext,
    engine: &dyn StorageEngine,
    target: &WriteTarget,
    entries: &[Entry],
    policy: &RetryPolicy,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }

    match write_with_retry(ctx, engine, target, entries, policy, shutdown) {
        Ok(()) => Ok(()),
        Err(RetryFailure::Failed(StorageError::TransactionTooLarge)) if entries.len() > 1 => {
            tracing::warn!(
                target_ns = target.namespace(),
                entries = entries.len(),
                "Batch too large for one transaction, inserting entries one at a time"
            );
            let detached = ShutdownSignal::new();
            for (i, entry) in entries.iter().enumerate() {
                let signal = if i == 0 { shutdown } else { &detached };
                write_with_retry(
                    ctx,
                    engine,
                    target,
                    std::slice::from_ref(entry),
                    policy,
                    signal,
                )
                .map_err(|failure| into_error(failure, target))?;
            }
            Ok(())
        }
        Err(failure) => Err(into_error(failure, target)),
    }
}

fn write_with_retry(
    ctx: &OperationContext,
    engine: &dyn StorageEngine,
    target: &WriteTarget,
    entries: &[Entry],
    policy: &RetryPolicy,
    shutdown: &ShutdownSignal,
) -> std::result::Result<(), RetryFailure> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match target.write_range(ctx, engine, entries) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() => {
                if attempt >= max_attempts {
                    tracing::error!(
                        target_ns = target.namespace(),
                        attempts = attempt,
                        error = %e,
                        "Write failed after all retries"
                    );
                    return Err(RetryFailure::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                let backoff = policy.backoff_for(attempt);
                tracing::warn!(
                    target_ns = target.namespace(),
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient write failure, retrying"
                );
                if shutdown.sleep(backoff) {
                    return Err(RetryFailure::Failed(StorageError::InterruptedAtShutdown));
                }
            }
            Err(e) => return Err(RetryFailure::Failed(e)),
        }
    }
}

fn into_error(failure: RetryFailure, target: &WriteTarget) -> Error {
    match failure {
        RetryFailure::Exhausted { attempts, last } => Error::RetriesExhausted {
            target: target.namespace().to_string(),
            attempts,
            last_error: last.to_string(),
        },
        RetryFailure::Failed(e) => e.into_error(target.kind()),
    }
}
