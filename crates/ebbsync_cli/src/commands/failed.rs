//! Retry-failed and clear-failed command implementations.
//!
//! Both go through a [`SyncQueue`] held offline, so the log sees exactly the
//! transitions the running application would make and nothing is executed.

use super::require_log;
use ebbsync_engine::{MonitorConfig, NetworkMonitor, QueueConfig, SyncQueue};
use ebbsync_store::{FileBackend, LogStore};
use std::path::Path;
use tokio::runtime::Runtime;

type OfflineQueue = SyncQueue<LogStore<FileBackend>>;

fn open_offline(path: &Path) -> Result<(Runtime, OfflineQueue), Box<dyn std::error::Error>> {
    require_log(path)?;
    let store = LogStore::open_file(path)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let config = QueueConfig::default()
        .with_process_on_enqueue(false)
        .with_completed_retention(None)
        .with_failed_retention(None);
    let monitor = NetworkMonitor::new(MonitorConfig::default());
    let queue = runtime.block_on(SyncQueue::open(store, monitor, config))?;
    Ok((runtime, queue))
}

/// Resets every failed operation to pending. Returns how many were reset.
pub fn retry_failed(path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let (runtime, queue) = open_offline(path)?;
    Ok(runtime.block_on(queue.retry_failed())?)
}

/// Removes every failed operation. Returns how many were removed.
pub fn clear_failed(path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let (runtime, queue) = open_offline(path)?;
    Ok(runtime.block_on(queue.clear_failed())?)
}

/// Runs the retry-failed command.
pub fn retry(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let count = retry_failed(path)?;
    println!("Reset {} failed operation(s) to pending", count);
    Ok(())
}

/// Runs the clear-failed command.
pub fn clear(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let count = clear_failed(path)?;
    println!("Removed {} failed operation(s)", count);
    Ok(())
}
