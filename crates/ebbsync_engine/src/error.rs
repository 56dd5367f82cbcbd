//! Error types for the sync engine.

use ebbsync_store::{OperationId, OperationStatus, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The backend could not be reached or answered with a temporary failure.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// The backend refused the operation; retrying will not help.
    #[error("rejected by server: {0}")]
    PermanentRejection(String),

    /// The operation store failed to read or write.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// No pending conflict has the given id.
    #[error("conflict not found: {0}")]
    ConflictNotFound(String),

    /// The network call did not finish in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// No executor is registered for the operation type.
    #[error("no executor registered for operation type '{0}'")]
    NoExecutor(String),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Background(String),

    /// An operation was asked to make a move its lifecycle forbids.
    #[error("operation {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The operation.
        id: OperationId,
        /// Its current status.
        from: OperationStatus,
        /// The refused status.
        to: OperationStatus,
    },
}

impl SyncError {
    /// Creates a retryable network error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetwork(message.into())
    }

    /// Creates a non-retryable rejection.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::PermanentRejection(message.into())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::TransientNetwork(_)
            | SyncError::Timeout(_)
            | SyncError::Persistence(_)
            | SyncError::Background(_) => true,
            SyncError::PermanentRejection(_)
            | SyncError::ConflictNotFound(_)
            | SyncError::NoExecutor(_)
            | SyncError::InvalidTransition { .. } => false,
        }
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Background(err.to_string())
    }
}
