//! Concurrency primitives for the log write path
//!
//! This crate implements the blocking building blocks the write loop is
//! driven by:
//! - [`BoundedBuffer`]: capacity-bounded FIFO with a drain-mode flag
//! - [`ShutdownSignal`] / [`PauseSignal`]: cancellation and test pause
//! - [`OperationContext`] with scoped admission priority and
//!   unreplicated-write guards
//! - [`AdmissionController`]: shared ticket pool that exempt work bypasses

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admission;
pub mod buffer;
pub mod signal;

pub use admission::{
    AdmissionController, AdmissionError, AdmissionPriority, OperationContext,
    ScopedAdmissionPriority, Ticket, UnreplicatedWritesBlock,
};
pub use buffer::{BoundedBuffer, Interrupted, Popped};
pub use signal::{PauseSignal, ShutdownSignal};
