//! Ordered in-memory storage engine
//!
//! `InMemoryEngine` is a complete [`StorageEngine`] that keeps each target
//! as a `BTreeMap` keyed by [`EntryId`]. It is used for embedded nodes that
//! run without disk and as the engine under every write path test.
//!
//! # Semantics
//!
//! - Inserts are staged in the transaction and applied atomically on
//!   commit; dropping the transaction discards them
//! - Every insert must extend the target strictly in order
//! - The visible position only advances under ordered commit
//! - An optional [`AdmissionController`] is consulted in `begin`
//! - Faults can be queued per target; each `insert_ordered` call consumes
//!   one queued fault before doing any work
//! - A fault can also be pinned to an entry id; it fires on the first
//!   insert whose range starts at that id
//!
//! # Example
//!
//! ```
//! use logwriter_concurrency::OperationContext;
//! use logwriter_core::{Entry, Timestamp};
//! use logwriter_storage::{InMemoryEngine, TargetKind, WriteTarget};
//!
//! let engine = InMemoryEngine::new();
//! let ctx = OperationContext::new("example");
//! let batch = vec![Entry::now(Timestamp::new(1, 1), 1, b"op".to_vec())];
//! WriteTarget::log_store().write_range(&ctx, &engine, &batch).unwrap();
//! assert_eq!(engine.entries(TargetKind::LogStore).len(), 1);
//! ```

use crate::engine::{StorageEngine, StorageTransaction};
use crate::error::{StorageError, StorageResult};
use crate::journal::JournalMode;
use crate::target::TargetKind;
use logwriter_concurrency::{
    AdmissionController, AdmissionPriority, OperationContext, Ticket,
};
use logwriter_core::{Entry, EntryId, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Record of one committed range, kept for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Target written
    pub kind: TargetKind,
    /// First id of the range
    pub first: EntryId,
    /// Last id of the range
    pub last: EntryId,
    /// Number of entries in the range
    pub count: usize,
    /// Admission priority of the writer at begin time
    pub priority: AdmissionPriority,
    /// Whether the writer had write re-logging enabled
    pub replicated: bool,
}

/// Builder for [`InMemoryEngine`]
#[derive(Debug, Default)]
pub struct InMemoryEngineBuilder {
    journal: JournalMode,
    missing: Vec<TargetKind>,
    admission: Option<(AdmissionController, Duration)>,
    max_transaction_entries: Option<usize>,
}

impl InMemoryEngineBuilder {
    /// Set the journal mode
    pub fn journal(mut self, mode: JournalMode) -> Self {
        self.journal = mode;
        self
    }

    /// Shorthand for [`JournalMode::Ephemeral`]
    pub fn ephemeral(self) -> Self {
        self.journal(JournalMode::Ephemeral)
    }

    /// Create the engine without `kind`
    pub fn without_target(mut self, kind: TargetKind) -> Self {
        self.missing.push(kind);
        self
    }

    /// Consult `controller` in every `begin`, waiting up to `timeout`
    pub fn admission(mut self, controller: AdmissionController, timeout: Duration) -> Self {
        self.admission = Some((controller, timeout));
        self
    }

    /// Reject transactions staging more than `limit` entries
    pub fn max_transaction_entries(mut self, limit: usize) -> Self {
        self.max_transaction_entries = Some(limit);
        self
    }

    /// Build the engine
    pub fn build(self) -> InMemoryEngine {
        let mut targets = HashMap::new();
        for kind in [TargetKind::LogStore, TargetKind::ChangeFeed] {
            if !self.missing.contains(&kind) {
                targets.insert(kind, BTreeMap::new());
            }
        }
        InMemoryEngine {
            targets: RwLock::new(targets),
            visible: Mutex::new(Timestamp::NULL),
            journal: self.journal,
            admission: self.admission,
            max_transaction_entries: self.max_transaction_entries,
            faults: Mutex::new(HashMap::new()),
            pinned_faults: Mutex::new(Vec::new()),
            commits: Mutex::new(HashMap::new()),
            records: Mutex::new(Vec::new()),
            journal_flushes: AtomicU64::new(0),
        }
    }
}

/// Ordered in-memory engine
pub struct InMemoryEngine {
    targets: RwLock<HashMap<TargetKind, BTreeMap<EntryId, Entry>>>,
    visible: Mutex<Timestamp>,
    journal: JournalMode,
    admission: Option<(AdmissionController, Duration)>,
    max_transaction_entries: Option<usize>,
    faults: Mutex<HashMap<TargetKind, VecDeque<StorageError>>>,
    pinned_faults: Mutex<Vec<(TargetKind, EntryId, StorageError)>>,
    commits: Mutex<HashMap<TargetKind, u64>>,
    records: Mutex<Vec<WriteRecord>>,
    journal_flushes: AtomicU64,
}

impl InMemoryEngine {
    /// Create a journaled engine with both targets
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building an engine
    pub fn builder() -> InMemoryEngineBuilder {
        InMemoryEngineBuilder::default()
    }

    /// Create `kind` if it does not exist
    pub fn create_target(&self, kind: TargetKind) {
        self.targets.write().entry(kind).or_default();
    }

    /// Queue faults returned by the next inserts into `kind`
    pub fn inject_failures(&self, kind: TargetKind, errors: impl IntoIterator<Item = StorageError>) {
        self.faults.lock().entry(kind).or_default().extend(errors);
    }

    /// Fail the first insert into `kind` whose range starts at `id`
    pub fn inject_failure_at(&self, kind: TargetKind, id: EntryId, error: StorageError) {
        self.pinned_faults.lock().push((kind, id, error));
    }

    /// Number of queued and pinned faults not yet consumed for `kind`
    pub fn pending_failures(&self, kind: TargetKind) -> usize {
        let queued = self.faults.lock().get(&kind).map_or(0, |q| q.len());
        let pinned = self
            .pinned_faults
            .lock()
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .count();
        queued + pinned
    }

    /// All entries stored in `kind`, in order
    pub fn entries(&self, kind: TargetKind) -> Vec<Entry> {
        self.targets
            .read()
            .get(&kind)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of committed transactions that wrote `kind`
    pub fn commit_count(&self, kind: TargetKind) -> u64 {
        self.commits.lock().get(&kind).copied().unwrap_or(0)
    }

    /// Every committed range, in commit order
    pub fn write_records(&self) -> Vec<WriteRecord> {
        self.records.lock().clone()
    }

    /// Number of journal flushes performed
    pub fn journal_flushes(&self) -> u64 {
        self.journal_flushes.load(Ordering::SeqCst)
    }

    /// Journal mode of this engine
    pub fn journal_mode(&self) -> JournalMode {
        self.journal
    }

    fn take_fault(&self, kind: TargetKind, entries: &[Entry]) -> Option<StorageError> {
        if let Some(fault) = self.faults.lock().get_mut(&kind).and_then(|q| q.pop_front()) {
            return Some(fault);
        }
        let mut pinned = self.pinned_faults.lock();
        let pos = pinned
            .iter()
            .position(|(k, id, _)| *k == kind && entries.first().map(Entry::id) == Some(*id))?;
        Some(pinned.remove(pos).2)
    }

    fn apply(&self, staged: Vec<(TargetKind, Vec<Entry>)>, priority: AdmissionPriority, replicated: bool) -> StorageResult<()> {
        let mut targets = self.targets.write();

        // Re-validate against committed state before touching anything
        for (kind, entries) in &staged {
            let target = targets
                .get(kind)
                .ok_or_else(|| StorageError::NamespaceNotFound(kind.namespace().to_string()))?;
            if let (Some(first), Some((last, _))) = (entries.first(), target.last_key_value()) {
                if first.id() <= *last {
                    return Err(StorageError::OutOfOrder {
                        target: kind.namespace().to_string(),
                        last: *last,
                        next: first.id(),
                    });
                }
            }
        }

        let mut commits = self.commits.lock();
        let mut records = self.records.lock();
        for (kind, entries) in staged {
            let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
                continue;
            };
            records.push(WriteRecord {
                kind,
                first: first.id(),
                last: last.id(),
                count: entries.len(),
                priority,
                replicated,
            });
            *commits.entry(kind).or_insert(0) += 1;
            if let Some(target) = targets.get_mut(&kind) {
                target.extend(entries.into_iter().map(|e| (e.id(), e)));
            }
        }
        Ok(())
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEngine")
            .field("journal", &self.journal)
            .field("visible", &*self.visible.lock())
            .finish()
    }
}

impl StorageEngine for InMemoryEngine {
    fn begin<'a>(
        &'a self,
        ctx: &OperationContext,
    ) -> StorageResult<Box<dyn StorageTransaction + 'a>> {
        let ticket = match &self.admission {
            Some((controller, timeout)) => Some(controller.acquire(ctx, *timeout)?),
            None => None,
        };
        Ok(Box::new(MemoryTransaction {
            engine: self,
            staged: Vec::new(),
            priority: ctx.priority(),
            replicated: ctx.writes_are_replicated(),
            _ticket: ticket,
        }))
    }

    fn register_visible_position(
        &self,
        timestamp: Timestamp,
        ordered_commit: bool,
    ) -> StorageResult<()> {
        let mut visible = self.visible.lock();
        if timestamp > *visible || !ordered_commit {
            *visible = timestamp;
        }
        Ok(())
    }

    fn visible_position(&self) -> Timestamp {
        *self.visible.lock()
    }

    fn has_target(&self, kind: TargetKind) -> bool {
        self.targets.read().contains_key(&kind)
    }

    fn last_entry_id(&self, kind: TargetKind) -> StorageResult<Option<EntryId>> {
        let targets = self.targets.read();
        let target = targets
            .get(&kind)
            .ok_or_else(|| StorageError::NamespaceNotFound(kind.namespace().to_string()))?;
        Ok(target.last_key_value().map(|(id, _)| *id))
    }

    fn is_ephemeral(&self) -> bool {
        !self.journal.requires_flush()
    }

    fn flush_journal(&self) -> StorageResult<()> {
        if self.journal.requires_flush() {
            self.journal_flushes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MemoryTransaction<'a> {
    engine: &'a InMemoryEngine,
    staged: Vec<(TargetKind, Vec<Entry>)>,
    priority: AdmissionPriority,
    replicated: bool,
    _ticket: Option<Ticket>,
}

impl MemoryTransaction<'_> {
    fn staged_len(&self) -> usize {
        self.staged.iter().map(|(_, e)| e.len()).sum()
    }

    fn last_staged(&self, kind: TargetKind) -> Option<EntryId> {
        self.staged
            .iter()
            .rev()
            .find(|(k, e)| *k == kind && !e.is_empty())
            .and_then(|(_, e)| e.last().map(Entry::id))
    }
}

impl StorageTransaction for MemoryTransaction<'_> {
    fn insert_ordered(&mut self, kind: TargetKind, entries: &[Entry]) -> StorageResult<()> {
        if let Some(fault) = self.engine.take_fault(kind, entries) {
            return Err(fault);
        }
        if !self.engine.has_target(kind) {
            return Err(StorageError::NamespaceNotFound(kind.namespace().to_string()));
        }
        if let Some(limit) = self.engine.max_transaction_entries {
            if self.staged_len() + entries.len() > limit {
                return Err(StorageError::TransactionTooLarge);
            }
        }

        let committed_last = self.engine.last_entry_id(kind)?;
        let mut last = self.last_staged(kind).or(committed_last);
        for entry in entries {
            if let Some(prev) = last {
                if entry.id() <= prev {
                    return Err(StorageError::OutOfOrder {
                        target: kind.namespace().to_string(),
                        last: prev,
                        next: entry.id(),
                    });
                }
            }
            last = Some(entry.id());
        }

        self.staged.push((kind, entries.to_vec()));
        Ok(())
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        let this = *self;
        this.engine.apply(this.staged, this.priority, this.replicated)
    }
}
