//! # Logwriter
//!
//! Ordered, fail-fast write path for a replicated durability log.
//!
//! Entries appended to the inbound buffer are persisted in batches to the
//! log store (and optionally the change feed), made visible, recorded in
//! the last-written watermark, and handed to the outbound buffer in exactly
//! the order they were appended.
//!
//! ## Quick Start
//!
//! ```no_run
//! use logwriter::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> logwriter::Result<()> {
//! let engine = Arc::new(InMemoryEngine::new());
//! let writer = LogWriter::builder(engine).start()?;
//!
//! writer.append(vec![Entry::now(Timestamp::new(1, 1), 1, b"op".to_vec())])?;
//! let persisted = writer.outbound().pop_batch(
//!     std::time::Duration::from_secs(1),
//!     usize::MAX,
//!     writer.shutdown_signal(),
//! );
//!
//! writer.close()?;
//! # let _ = persisted;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! | Crate | Role |
//! |-------|------|
//! | [`types`] | entry ids, entries, errors |
//! | [`concurrency`] | bounded buffers, shutdown and pause signals, admission |
//! | [`storage`] | engine interface, write targets, retry, in-memory engine |
//! | [`durability`] | watermarks, replication boundary, journal flusher |
//! | [`engine`] | configuration, batcher, persistence adapter, write loop |

#![warn(missing_docs)]

mod log_writer;

pub mod logging;
pub mod prelude;

pub use log_writer::{LogWriter, LogWriterBuilder};
pub use logwriter_core::{Error, Result};

pub use logwriter_concurrency as concurrency;
pub use logwriter_core as types;
pub use logwriter_durability as durability;
pub use logwriter_engine as engine;
pub use logwriter_storage as storage;
