//! Crash simulation for log backends.
//!
//! [`CrashableBackend`] wraps a real backend and "crashes" once a byte budget
//! is spent: the write crossing the budget lands partially, and every later
//! mutation fails, the way a killed process would leave its log. Reopening a
//! store over the surviving bytes exercises recovery.

use ebbsync_store::{InMemoryBackend, LogBackend, StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A backend wrapper that can simulate crashes.
pub struct CrashableBackend<B: LogBackend> {
    inner: B,
    state: Arc<CrashState>,
}

/// Shared crash controls, usable after the backend moved into a store.
#[derive(Debug)]
pub struct CrashState {
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

impl CrashState {
    fn new() -> Self {
        Self {
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        }
    }

    /// Crashes once `bytes` more bytes have been written.
    pub fn crash_after(&self, bytes: usize) {
        self.bytes_written.store(0, Ordering::SeqCst);
        self.crash_after_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Crashes on the next sync.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Clears the crash and the budget.
    pub fn reset(&self) {
        self.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.bytes_written.store(0, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_on_sync.store(false, Ordering::SeqCst);
    }

    fn crash(&self, what: &str) -> StoreError {
        self.crashed.store(true, Ordering::SeqCst);
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }

    fn check_alive(&self, what: &str) -> StoreResult<()> {
        if self.has_crashed() {
            return Err(self.crash(what));
        }
        Ok(())
    }
}

impl<B: LogBackend> CrashableBackend<B> {
    /// Creates a new crashable backend wrapping an inner backend.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            state: Arc::new(CrashState::new()),
        }
    }

    /// Handle to the crash controls.
    pub fn controls(&self) -> Arc<CrashState> {
        Arc::clone(&self.state)
    }
}

impl CrashableBackend<InMemoryBackend> {
    /// Wraps a fresh in-memory backend. The second value shares its bytes and
    /// stays readable after the crash.
    pub fn in_memory() -> (Self, InMemoryBackend) {
        let bytes = InMemoryBackend::new();
        (Self::new(bytes.clone()), bytes)
    }
}

impl<B: LogBackend> LogBackend for CrashableBackend<B> {
    fn read_all(&self) -> StoreResult<Vec<u8>> {
        self.inner.read_all()
    }

    fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        self.state.check_alive("append")?;

        let current = self.state.bytes_written.fetch_add(data.len(), Ordering::SeqCst);
        let threshold = self.state.crash_after_bytes.load(Ordering::SeqCst);

        if current >= threshold {
            return Err(self.state.crash("append"));
        }
        if current + data.len() > threshold {
            // Partial data up to the crash point.
            let partial = threshold - current;
            if partial > 0 {
                let _ = self.inner.append(&data[..partial]);
            }
            return Err(self.state.crash("partial append"));
        }

        self.inner.append(data)
    }

    fn sync(&mut self) -> StoreResult<()> {
        self.state.check_alive("sync")?;
        if self.state.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.state.crash("sync"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StoreResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StoreResult<()> {
        self.state.check_alive("truncate")?;
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StoreResult<()> {
        self.state.check_alive("replace")?;
        self.inner.replace(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_leaves_partial_write() {
        let (mut backend, bytes) = CrashableBackend::in_memory();
        backend.controls().crash_after(6);

        backend.append(b"abcd").unwrap();
        assert!(backend.append(b"efgh").is_err());
        assert!(backend.controls().has_crashed());
        assert_eq!(bytes.data(), b"abcdef".to_vec());
    }

    #[test]
    fn crashed_backend_refuses_rollback() {
        let (mut backend, bytes) = CrashableBackend::in_memory();
        backend.controls().crash_after(2);

        assert!(backend.append(b"xyz").is_err());
        assert!(backend.truncate(0).is_err());
        assert_eq!(bytes.data(), b"xy".to_vec());
    }

    #[test]
    fn reset_revives_backend() {
        let (mut backend, _bytes) = CrashableBackend::in_memory();
        let controls = backend.controls();
        controls.set_fail_on_sync(true);
        assert!(backend.sync().is_err());

        controls.reset();
        backend.append(b"ok").unwrap();
        backend.sync().unwrap();
    }
}
