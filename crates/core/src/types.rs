//! Logical clock and entry identifiers
//!
//! - [`Timestamp`]: logical clock value made of `(secs, inc)`
//! - [`EntryId`]: `(timestamp, term)` pair used as the log's order key
//! - [`EntryIdAndWallTime`]: last id of a batch plus its wall clock time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Leadership epoch number
pub type Term = i64;

/// Logical clock value
///
/// The high 32 bits hold seconds and the low 32 bits hold an increment
/// that disambiguates entries produced within the same second. Comparing
/// the raw `u64` therefore compares `(secs, inc)` lexicographically.
///
/// # Examples
///
/// ```
/// use logwriter_core::Timestamp;
///
/// let a = Timestamp::new(10, 1);
/// let b = Timestamp::new(10, 2);
/// assert!(a < b);
/// assert_eq!(b.secs(), 10);
/// assert_eq!(b.inc(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The null timestamp, ordered before every real timestamp
    pub const NULL: Timestamp = Timestamp(0);

    /// Create a timestamp from seconds and increment
    pub fn new(secs: u32, inc: u32) -> Self {
        Timestamp(((secs as u64) << 32) | inc as u64)
    }

    /// Create a timestamp from its raw representation
    pub fn from_raw(raw: u64) -> Self {
        Timestamp(raw)
    }

    /// Raw 64-bit representation
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Seconds component
    pub fn secs(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Increment component
    pub fn inc(&self) -> u32 {
        self.0 as u32
    }

    /// Check if this is the null timestamp
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}, {})", self.secs(), self.inc())
    }
}

/// Total order key for a log entry
///
/// Ordering compares `term` first and `timestamp` second, so an entry
/// written in a newer leadership epoch always sorts after entries from
/// older epochs. Within one epoch the timestamp decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EntryId {
    /// Logical clock value of the entry
    pub timestamp: Timestamp,
    /// Leadership epoch the entry was produced in
    pub term: Term,
}

impl EntryId {
    /// The null id, ordered before every real id
    pub const NULL: EntryId = EntryId {
        timestamp: Timestamp::NULL,
        term: 0,
    };

    /// Create a new entry id
    pub fn new(timestamp: Timestamp, term: Term) -> Self {
        Self { timestamp, term }
    }

    /// Check if this is the null id
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl Ord for EntryId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.term
            .cmp(&other.term)
            .then(self.timestamp.cmp(&other.timestamp))
    }
}

impl PartialOrd for EntryId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ts: {}, t: {} }}", self.timestamp, self.term)
    }
}

/// Entry id paired with the wall clock time the entry was produced at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryIdAndWallTime {
    /// Entry id
    pub id: EntryId,
    /// Wall clock time recorded by the producer
    pub wall_time: DateTime<Utc>,
}

impl EntryIdAndWallTime {
    /// Create a new pair
    pub fn new(id: EntryId, wall_time: DateTime<Utc>) -> Self {
        Self { id, wall_time }
    }

    /// Null id at the Unix epoch, the value before anything was written
    pub fn null() -> Self {
        Self::new(EntryId::NULL, DateTime::<Utc>::default())
    }
}
