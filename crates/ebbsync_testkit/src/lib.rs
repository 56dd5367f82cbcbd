//! # ebbsync testkit
//!
//! Test utilities for ebbsync.
//!
//! This crate provides:
//! - Crash simulation for log backends
//! - A store wrapper that injects persistence failures
//! - Fixtures for temporary stores and operations
//! - Property-based generators for entities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ebbsync_testkit::prelude::*;
//!
//! let (backend, bytes) = CrashableBackend::in_memory();
//! backend.controls().crash_after(100);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod flaky;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::flaky::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use flaky::*;
pub use generators::*;
