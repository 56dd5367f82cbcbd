//! The operation store contract used by the sync queue.

use crate::error::StoreResult;
use crate::operation::{OperationId, OperationStatus, QueuedOperation, Timestamp};

/// Iterator over stored operations.
pub type OperationIter = Box<dyn Iterator<Item = QueuedOperation> + Send>;

/// Durable home of queued operations.
///
/// The store is a passive medium: it never changes an operation on its own.
/// Every method may block on I/O, so async callers should run them off the
/// executor threads.
///
/// # Invariants
///
/// - at most one operation exists per id; `put` overwrites
/// - when `put` or `delete` returns `Ok`, the change survives a crash
///   (subject to the store's durability setting)
/// - `delete` of an unknown id is a no-op
pub trait OperationStore: Send + Sync {
    /// Inserts or overwrites an operation by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be made durable. The caller must
    /// not treat the new state as committed.
    fn put(&self, operation: &QueuedOperation) -> StoreResult<()>;

    /// Looks an operation up by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, id: &OperationId) -> StoreResult<Option<QueuedOperation>>;

    /// Returns every stored operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_all(&self) -> StoreResult<OperationIter>;

    /// Removes an operation. Deleting an unknown id succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be made durable.
    fn delete(&self, id: &OperationId) -> StoreResult<()>;

    /// Removes operations in one of `statuses` whose last activity is older
    /// than `cutoff`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a removal cannot be made durable. Removals made
    /// before the failure stay removed.
    fn delete_older_than(
        &self,
        cutoff: Timestamp,
        statuses: &[OperationStatus],
    ) -> StoreResult<usize> {
        let expired: Vec<OperationId> = self
            .list_all()?
            .filter(|op| statuses.contains(&op.status) && op.last_activity() < cutoff)
            .map(|op| op.id)
            .collect();
        for id in &expired {
            self.delete(id)?;
        }
        Ok(expired.len())
    }
}

impl<S: OperationStore + ?Sized> OperationStore for std::sync::Arc<S> {
    fn put(&self, operation: &QueuedOperation) -> StoreResult<()> {
        (**self).put(operation)
    }

    fn get(&self, id: &OperationId) -> StoreResult<Option<QueuedOperation>> {
        (**self).get(id)
    }

    fn list_all(&self) -> StoreResult<OperationIter> {
        (**self).list_all()
    }

    fn delete(&self, id: &OperationId) -> StoreResult<()> {
        (**self).delete(id)
    }

    fn delete_older_than(
        &self,
        cutoff: Timestamp,
        statuses: &[OperationStatus],
    ) -> StoreResult<usize> {
        (**self).delete_older_than(cutoff, statuses)
    }
}
