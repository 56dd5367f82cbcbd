//! Test fixtures and store helpers.

use ebbsync_store::{FileBackend, LogStore, LogStoreOptions, QueuedOperation, StoreResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A queue log in a temporary directory, removed on drop.
pub struct TempLog {
    dir: TempDir,
}

impl TempLog {
    /// Creates an empty temporary directory for a log.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("queue.log")
    }

    /// The temporary directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Opens a store over the log with default options.
    ///
    /// # Errors
    ///
    /// Fails if the log is locked or corrupted.
    pub fn open(&self) -> StoreResult<LogStore<FileBackend>> {
        LogStore::open_file(&self.path())
    }

    /// Opens a store over the log.
    ///
    /// # Errors
    ///
    /// Fails if the log is locked or corrupted.
    pub fn open_with(&self, options: LogStoreOptions) -> StoreResult<LogStore<FileBackend>> {
        LogStore::open_file_with(&self.path(), options)
    }
}

impl Default for TempLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a pending operation with a small payload naming its type.
pub fn operation(op_type: &str, priority: i32, sequence: u64) -> QueuedOperation {
    QueuedOperation::new(
        op_type,
        serde_json::json!({ "kind": op_type, "seq": sequence }),
        priority,
        sequence,
    )
}

/// Converts a JSON object literal to an entity map.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn entity(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("entity fixture must be a JSON object, got {other}"),
    }
}
