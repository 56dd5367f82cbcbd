//! # ebbsync Store
//!
//! Durable operation store for the ebbsync offline queue.
//!
//! The store persists [`QueuedOperation`]s so a queue survives process
//! restarts. It is a passive medium: the sync queue owns every state change,
//! the store only records them.
//!
//! ## Layers
//!
//! - [`LogBackend`] - opaque append-only bytes ([`FileBackend`], [`InMemoryBackend`])
//! - [`record`] - checksummed record framing over those bytes
//! - [`LogStore`] - an [`OperationStore`] replaying the log into an index
//!
//! ## Example
//!
//! ```rust
//! use ebbsync_store::{LogStore, OperationStore, QueuedOperation};
//! use serde_json::json;
//!
//! let store = LogStore::in_memory();
//! let op = QueuedOperation::new("create_message", json!({"text": "hi"}), 1, 0);
//! store.put(&op).unwrap();
//! assert_eq!(store.get(&op.id).unwrap(), Some(op));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod log_store;
mod memory;
mod operation;
pub mod record;
mod store;

pub use backend::LogBackend;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use log_store::{CompactionStats, Durability, LogStore, LogStoreOptions, RecoveryInfo};
pub use memory::InMemoryBackend;
pub use operation::{OperationId, OperationStatus, QueuedOperation, Timestamp};
pub use store::{OperationIter, OperationStore};
