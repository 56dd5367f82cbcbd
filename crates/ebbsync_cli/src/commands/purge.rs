//! Purge command implementation.

use super::require_log;
use ebbsync_store::{LogStore, OperationStatus, OperationStore, Timestamp};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Removes completed (and optionally failed) operations idle for longer
/// than `older_than`. Returns how many were removed.
pub fn purge(
    path: &Path,
    older_than: Duration,
    include_failed: bool,
) -> Result<usize, Box<dyn std::error::Error>> {
    require_log(path)?;
    let store = LogStore::open_file(path)?;

    let mut statuses = vec![OperationStatus::Completed];
    if include_failed {
        statuses.push(OperationStatus::Failed);
    }
    let cutoff = Timestamp::now().saturating_sub(older_than);
    let removed = store.delete_older_than(cutoff, &statuses)?;
    info!(removed, cutoff = cutoff.as_millis(), "purged operations");
    Ok(removed)
}

/// Runs the purge command.
pub fn run(
    path: &Path,
    older_than_secs: u64,
    include_failed: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let removed = purge(path, Duration::from_secs(older_than_secs), include_failed)?;
    println!("Removed {} operation(s)", removed);
    Ok(())
}
