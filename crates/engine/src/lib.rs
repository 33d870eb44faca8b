//! Write loop for the replicated durability log
//!
//! Ties the lower layers together into the single-writer pipeline:
//!
//! ```text
//! inbound buffer -> Batcher -> PersistenceAdapter -> DurabilityCoordinator -> outbound buffer
//!                               (log store, change feed)
//! ```
//!
//! - [`WriterConfig`]: TOML configuration, resolved once into [`WriterOptions`]
//! - [`Batcher`]: time-bounded pulls from the inbound buffer
//! - [`PersistenceAdapter`]: writes one batch to every target
//! - [`WriteLoop`]: the state machine driving it all on a dedicated thread

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batcher;
pub mod config;
pub mod metrics;
pub mod observer;
pub mod write_loop;
pub mod writer;

pub use batcher::{Batch, Batcher};
pub use config::{ConfigError, FatalPolicy, RetryConfig, WriterConfig, WriterOptions};
pub use metrics::{MetricsSink, NoopMetrics, WriterReport, WriterStats};
pub use observer::{NoopObserver, WriteObserver};
pub use write_loop::{LoopExit, LoopState, WriteLoop, WriteLoopBuilder, WriteLoopHandle};
pub use writer::{PersistenceAdapter, WriteFailure};
