//! Failure injection for operation stores.

use ebbsync_store::{
    OperationId, OperationIter, OperationStore, QueuedOperation, StoreError, StoreResult,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct FailurePlan {
    skip: usize,
    fail: usize,
}

impl FailurePlan {
    /// Returns true if the current call should fail.
    fn next(&mut self) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            false
        } else if self.fail > 0 {
            self.fail -= 1;
            true
        } else {
            false
        }
    }
}

/// Store wrapper whose writes fail on demand.
///
/// Failed calls never reach the inner store, so they behave like a write that
/// was not made durable.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    puts: Mutex<FailurePlan>,
    deletes: Mutex<FailurePlan>,
    put_calls: AtomicUsize,
}

impl<S: OperationStore> FlakyStore<S> {
    /// Wraps a store. No failures are planned.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            puts: Mutex::new(FailurePlan::default()),
            deletes: Mutex::new(FailurePlan::default()),
            put_calls: AtomicUsize::new(0),
        }
    }

    /// Lets the next `skip` puts through, then fails `count` of them.
    pub fn fail_puts_after(&self, skip: usize, count: usize) {
        *self.puts.lock() = FailurePlan { skip, fail: count };
    }

    /// Fails the next `count` puts.
    pub fn fail_next_puts(&self, count: usize) {
        self.fail_puts_after(0, count);
    }

    /// Lets the next `skip` deletes through, then fails `count` of them.
    pub fn fail_deletes_after(&self, skip: usize, count: usize) {
        *self.deletes.lock() = FailurePlan { skip, fail: count };
    }

    /// Fails the next `count` deletes.
    pub fn fail_next_deletes(&self, count: usize) {
        self.fail_deletes_after(0, count);
    }

    /// Number of `put` calls seen, failed ones included.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("injected {what} failure"),
        ))
    }
}

impl<S: OperationStore> OperationStore for FlakyStore<S> {
    fn put(&self, operation: &QueuedOperation) -> StoreResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.puts.lock().next() {
            return Err(Self::injected("put"));
        }
        self.inner.put(operation)
    }

    fn get(&self, id: &OperationId) -> StoreResult<Option<QueuedOperation>> {
        self.inner.get(id)
    }

    fn list_all(&self) -> StoreResult<OperationIter> {
        self.inner.list_all()
    }

    fn delete(&self, id: &OperationId) -> StoreResult<()> {
        if self.deletes.lock().next() {
            return Err(Self::injected("delete"));
        }
        self.inner.delete(id)
    }
}
