//! Byte-level backend trait for the operation log.

use crate::error::StoreResult;

/// An append-only byte medium holding the operation log.
///
/// Backends do not interpret what they hold; framing and checksums belong to
/// [`crate::LogStore`].
///
/// # Invariants
///
/// - `append` writes at the current end and returns the offset it wrote at
/// - `read_all` returns every byte previously appended and not truncated
/// - after `sync` returns, appended bytes survive process termination
/// - `replace` is atomic: readers after a crash see either the old or the new
///   contents, never a mix
pub trait LogBackend: Send + Sync {
    /// Reads the whole log.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_all(&self) -> StoreResult<Vec<u8>>;

    /// Appends bytes and returns the offset they were written at.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StoreResult<u64>;

    /// Makes every appended byte durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StoreResult<()>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StoreResult<u64>;

    /// Cuts the log back to `new_size` bytes. Used to drop a torn final record.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or I/O fails.
    fn truncate(&mut self, new_size: u64) -> StoreResult<()>;

    /// Atomically swaps the whole log for `data`. Used by compaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the new contents cannot be made durable.
    fn replace(&mut self, data: &[u8]) -> StoreResult<()>;
}

impl<B: LogBackend + ?Sized> LogBackend for Box<B> {
    fn read_all(&self) -> StoreResult<Vec<u8>> {
        (**self).read_all()
    }

    fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        (**self).append(data)
    }

    fn sync(&mut self) -> StoreResult<()> {
        (**self).sync()
    }

    fn size(&self) -> StoreResult<u64> {
        (**self).size()
    }

    fn truncate(&mut self, new_size: u64) -> StoreResult<()> {
        (**self).truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StoreResult<()> {
        (**self).replace(data)
    }
}
