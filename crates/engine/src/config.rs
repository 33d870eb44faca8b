//! Writer configuration
//!
//! [`WriterConfig`] is what a deployment writes in TOML. Every field has a
//! default, so an empty document is a valid configuration. It is resolved
//! once at startup into [`WriterOptions`], which holds plain values and is
//! what the write loop actually reads.
//!
//! ```toml
//! batch_wait_ms = 1000
//! write_change_feed = true
//! fatal_policy = "abort"
//!
//! [retry]
//! max_attempts = 10
//! initial_backoff_ms = 10
//! max_backoff_ms = 1000
//! ```

use logwriter_storage::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading and validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML for [`WriterConfig`]
    #[error("invalid writer configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid writer configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for logwriter_core::Error {
    fn from(e: ConfigError) -> Self {
        logwriter_core::Error::Config(e.to_string())
    }
}

/// What to do when the write loop hits a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalPolicy {
    /// Log the error and abort the process
    #[default]
    Abort,
    /// Return the error from [`crate::WriteLoopHandle::join`]
    Propagate,
}

/// Retry settings for transient storage failures
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per range, including the first
    pub max_attempts: u32,
    /// Backoff before the second attempt
    pub initial_backoff_ms: u64,
    /// Cap on any single backoff
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

/// Write loop configuration as written by a deployment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriterConfig {
    /// Upper bound on one wait for inbound entries
    pub batch_wait_ms: u64,
    /// Cap on entries per batch; unlimited when absent
    pub max_batch_entries: Option<usize>,
    /// Write every batch to the change feed as well
    pub write_change_feed: bool,
    /// Skip the log store write (entries are already there, e.g. replay
    /// during startup recovery)
    pub skip_log_store_writes: bool,
    /// Request a journal flush after each batch (ignored by ephemeral engines)
    pub flush_journal: bool,
    /// Capacity of the inbound buffer, in entries
    pub inbound_capacity: usize,
    /// Capacity of the outbound buffer, in entries
    pub outbound_capacity: usize,
    /// Retry settings
    pub retry: RetryConfig,
    /// Fatal error handling
    pub fatal_policy: FatalPolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_wait_ms: 1000,
            max_batch_entries: None,
            write_change_feed: false,
            skip_log_store_writes: false,
            flush_journal: true,
            inbound_capacity: 10_000,
            outbound_capacity: 10_000,
            retry: RetryConfig::default(),
            fatal_policy: FatalPolicy::Abort,
        }
    }
}

impl WriterConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate and convert into plain values
    pub fn resolve(&self) -> Result<WriterOptions, ConfigError> {
        if self.batch_wait_ms == 0 {
            return Err(ConfigError::Invalid("batch_wait_ms must be positive".into()));
        }
        if self.max_batch_entries == Some(0) {
            return Err(ConfigError::Invalid(
                "max_batch_entries must be positive".into(),
            ));
        }
        if self.inbound_capacity == 0 || self.outbound_capacity == 0 {
            return Err(ConfigError::Invalid("buffer capacities must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }

        Ok(WriterOptions {
            batch_wait: Duration::from_millis(self.batch_wait_ms),
            max_batch_entries: self.max_batch_entries.unwrap_or(usize::MAX),
            write_change_feed: self.write_change_feed,
            skip_log_store_writes: self.skip_log_store_writes,
            flush_journal: self.flush_journal,
            inbound_capacity: self.inbound_capacity,
            outbound_capacity: self.outbound_capacity,
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts,
                initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            },
            fatal_policy: self.fatal_policy,
        })
    }
}

/// Resolved write loop options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Upper bound on one wait for inbound entries
    pub batch_wait: Duration,
    /// Cap on entries per batch
    pub max_batch_entries: usize,
    /// Write every batch to the change feed as well
    pub write_change_feed: bool,
    /// Skip the log store write
    pub skip_log_store_writes: bool,
    /// Request a journal flush after each batch
    pub flush_journal: bool,
    /// Capacity of the inbound buffer
    pub inbound_capacity: usize,
    /// Capacity of the outbound buffer
    pub outbound_capacity: usize,
    /// Retry policy for every target write
    pub retry: RetryPolicy,
    /// Fatal error handling
    pub fatal_policy: FatalPolicy,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            batch_wait: Duration::from_secs(1),
            max_batch_entries: usize::MAX,
            write_change_feed: false,
            skip_log_store_writes: false,
            flush_journal: true,
            inbound_capacity: 10_000,
            outbound_capacity: 10_000,
            retry: RetryPolicy::default(),
            fatal_policy: FatalPolicy::Abort,
        }
    }
}
