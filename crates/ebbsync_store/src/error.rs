//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The log is damaged somewhere other than its final record.
    #[error("operation log corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Byte offset of the damaged record.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// An operation could not be encoded for the log.
    #[error("encode error: {0}")]
    Encode(String),

    /// A log record payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Another process holds the store lock.
    #[error("store at {0} is locked by another process")]
    Locked(String),
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            reason: reason.into(),
        }
    }
}
