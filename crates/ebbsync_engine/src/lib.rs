//! # ebbsync engine
//!
//! Offline-first synchronization engine.
//!
//! This crate provides:
//! - A durable, network-aware operation queue with retry and backoff
//! - A network status monitor with debounced change events
//! - Conflict detection and per-type resolution strategies
//! - A facade aggregating all of it for the application
//!
//! ## Architecture
//!
//! Application mutations are appended to the [`SyncQueue`], which persists
//! them through an [`ebbsync_store::OperationStore`] before anything else
//! happens. Processing passes replay operations through the
//! [`OperationExecutor`] registered for their type while the
//! [`NetworkMonitor`] reports online. The [`ConflictManager`] reconciles
//! divergent local and server entities. [`SyncFacade`] is the composition
//! root the rest of the application talks to.
//!
//! ## Key Invariants
//!
//! - State changes are persisted before they become visible
//! - Delivery is at-least-once; executors receive an idempotency key
//! - Operations of one type never overtake each other while retrying
//! - At most one processing pass runs at a time
//! - Listeners run without internal locks held; a panicking listener is
//!   logged and skipped

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod debounce;
mod error;
mod executor;
mod facade;
mod listeners;
mod network;
mod queue;

pub use config::{ConflictConfig, MonitorConfig, QueueConfig, RetryConfig, TieBreak};
pub use conflict::{
    conflicted_fields, entity_id, entity_timestamp, ConflictManager, ConflictRecord,
    ConflictStats, Entity, ManualChoice, MergeFn, Resolution, ResolutionStrategy, ResolvedBy,
    Side, StrategyConfig, METADATA_FIELDS,
};
pub use debounce::Debouncer;
pub use error::{SyncError, SyncResult};
pub use executor::{executor_fn, ExecuteRequest, FnExecutor, MockExecutor, MockReply, OperationExecutor};
pub use facade::{SyncFacade, SyncStats};
pub use listeners::{Listeners, Subscription};
pub use network::{
    classify, ConnectionQuality, ConnectivitySignal, NetworkChange, NetworkMonitor, NetworkStatus,
};
pub use queue::{ProcessOutcome, QueueStats, SyncQueue};

/// Version of the engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
