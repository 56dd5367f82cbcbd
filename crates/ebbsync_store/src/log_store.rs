//! Log-structured operation store.

use crate::backend::LogBackend;
use crate::error::StoreResult;
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use crate::operation::{OperationId, QueuedOperation};
use crate::record::{self, LogRecord};
use crate::store::{OperationIter, OperationStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// When appended records are forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Sync after every record. A returned `Ok` survives power loss.
    Sync,
    /// Leave flushing to the OS. Survives process crashes, not power loss.
    Buffered,
}

/// Options for a [`LogStore`].
#[derive(Debug, Clone)]
pub struct LogStoreOptions {
    /// Sync policy for appends.
    pub durability: Durability,
    /// Minimum number of dead records before automatic compaction.
    pub compact_min_dead: usize,
}

impl LogStoreOptions {
    /// Sets the durability policy.
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Sets the dead-record threshold for automatic compaction.
    pub fn with_compact_min_dead(mut self, count: usize) -> Self {
        self.compact_min_dead = count;
        self
    }
}

impl Default for LogStoreOptions {
    fn default() -> Self {
        Self {
            durability: Durability::Sync,
            compact_min_dead: 64,
        }
    }
}

/// What replaying the log found when the store was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryInfo {
    /// Well-formed records replayed.
    pub records: usize,
    /// Operations live after replay.
    pub live: usize,
    /// Bytes of an interrupted final write that were discarded.
    pub torn_bytes: u64,
}

/// Result of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Records dropped.
    pub records_dropped: usize,
}

struct LogState<B> {
    backend: B,
    index: BTreeMap<OperationId, QueuedOperation>,
    dead_records: usize,
}

/// An [`OperationStore`] that appends snapshots to a checksummed log.
///
/// Every `put` appends the full operation, every `delete` appends a
/// tombstone, and the latest record per id wins on replay. An in-memory index
/// answers reads. The log is rewritten to its live set once dead records
/// dominate.
///
/// # Crash safety
///
/// A crash mid-append leaves a torn final record, which the next open
/// discards. Damage anywhere else fails the open with
/// [`crate::StoreError::Corrupted`].
pub struct LogStore<B: LogBackend> {
    state: Mutex<LogState<B>>,
    options: LogStoreOptions,
    recovery: RecoveryInfo,
}

impl LogStore<FileBackend> {
    /// Opens a file-backed store with default options.
    ///
    /// # Errors
    ///
    /// Fails if the file is locked, unreadable, or corrupted.
    pub fn open_file(path: &Path) -> StoreResult<Self> {
        Self::open_file_with(path, LogStoreOptions::default())
    }

    /// Opens a file-backed store.
    ///
    /// # Errors
    ///
    /// Fails if the file is locked, unreadable, or corrupted.
    pub fn open_file_with(path: &Path, options: LogStoreOptions) -> StoreResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        Self::open(backend, options)
    }
}

impl LogStore<InMemoryBackend> {
    /// Creates an empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(LogState {
                backend: InMemoryBackend::new(),
                index: BTreeMap::new(),
                dead_records: 0,
            }),
            options: LogStoreOptions::default(),
            recovery: RecoveryInfo::default(),
        }
    }
}

impl<B: LogBackend> LogStore<B> {
    /// Opens a store over `backend`, replaying whatever it holds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Corrupted`] if the log is damaged before
    /// its final record, or an I/O error if it cannot be read or a torn tail
    /// cannot be truncated.
    pub fn open(mut backend: B, options: LogStoreOptions) -> StoreResult<Self> {
        let bytes = backend.read_all()?;
        let scan = record::scan(&bytes)?;

        if scan.torn_bytes > 0 {
            warn!(
                torn_bytes = scan.torn_bytes,
                valid_len = scan.valid_len,
                "discarding interrupted final record"
            );
            backend.truncate(scan.valid_len)?;
        }

        let mut index = BTreeMap::new();
        for (_, record) in &scan.records {
            match record {
                LogRecord::Put(op) => {
                    index.insert(op.id, op.clone());
                }
                LogRecord::Delete(id) => {
                    index.remove(id);
                }
            }
        }

        let recovery = RecoveryInfo {
            records: scan.records.len(),
            live: index.len(),
            torn_bytes: scan.torn_bytes,
        };
        info!(
            records = recovery.records,
            live = recovery.live,
            "operation log replayed"
        );

        Ok(Self {
            state: Mutex::new(LogState {
                backend,
                dead_records: recovery.records - recovery.live,
                index,
            }),
            options,
            recovery,
        })
    }

    /// Returns what replay found when the store was opened.
    pub fn recovery(&self) -> RecoveryInfo {
        self.recovery
    }

    /// Number of live operations.
    pub fn len(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Returns true if no operations are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of superseded records still in the log.
    pub fn dead_records(&self) -> usize {
        self.state.lock().dead_records
    }

    /// Rewrites the log so it holds exactly one record per live operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the new log cannot be written. The old log is left
    /// in place in that case.
    pub fn compact(&self) -> StoreResult<CompactionStats> {
        let mut state = self.state.lock();
        Self::compact_locked(&mut state)
    }

    fn compact_locked(state: &mut LogState<B>) -> StoreResult<CompactionStats> {
        let bytes_before = state.backend.size()?;
        let mut image = Vec::new();
        for op in state.index.values() {
            image.extend(LogRecord::Put(op.clone()).encode()?);
        }
        state.backend.replace(&image)?;

        let stats = CompactionStats {
            bytes_before,
            bytes_after: image.len() as u64,
            records_dropped: state.dead_records,
        };
        state.dead_records = 0;
        info!(
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            dropped = stats.records_dropped,
            "operation log compacted"
        );
        Ok(stats)
    }

    fn append_locked(&self, state: &mut LogState<B>, record: &LogRecord) -> StoreResult<()> {
        let bytes = record.encode()?;
        let size_before = state.backend.size()?;

        let written = state.backend.append(&bytes).and_then(|_| {
            if self.options.durability == Durability::Sync {
                state.backend.sync()
            } else {
                Ok(())
            }
        });

        if let Err(err) = written {
            // A partial record followed by later appends would read as corruption.
            if let Err(rollback) = state.backend.truncate(size_before) {
                warn!(error = %rollback, "could not roll back failed append");
            }
            return Err(err);
        }
        Ok(())
    }

    fn maybe_compact(&self, state: &mut LogState<B>) {
        if state.dead_records >= self.options.compact_min_dead
            && state.dead_records > state.index.len()
        {
            if let Err(err) = Self::compact_locked(state) {
                warn!(error = %err, "automatic compaction failed");
            }
        }
    }
}

impl<B: LogBackend> OperationStore for LogStore<B> {
    fn put(&self, operation: &QueuedOperation) -> StoreResult<()> {
        let mut state = self.state.lock();
        self.append_locked(&mut state, &LogRecord::Put(operation.clone()))?;

        if state.index.insert(operation.id, operation.clone()).is_some() {
            state.dead_records += 1;
        }
        debug!(id = %operation.id, status = %operation.status, "operation stored");
        self.maybe_compact(&mut state);
        Ok(())
    }

    fn get(&self, id: &OperationId) -> StoreResult<Option<QueuedOperation>> {
        Ok(self.state.lock().index.get(id).cloned())
    }

    fn list_all(&self) -> StoreResult<OperationIter> {
        let snapshot: Vec<QueuedOperation> = self.state.lock().index.values().cloned().collect();
        Ok(Box::new(snapshot.into_iter()))
    }

    fn delete(&self, id: &OperationId) -> StoreResult<()> {
        let mut state = self.state.lock();
        if !state.index.contains_key(id) {
            return Ok(());
        }
        self.append_locked(&mut state, &LogRecord::Delete(*id))?;

        state.index.remove(id);
        // The superseded put and the tombstone itself.
        state.dead_records += 2;
        debug!(id = %id, "operation deleted");
        self.maybe_compact(&mut state);
        Ok(())
    }
}
