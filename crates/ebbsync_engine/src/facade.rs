//! The integration surface for the application.
//!
//! [`SyncFacade`] folds queue, conflict and network state into one read
//! model and offers the few commands a UI needs. Failures come back as data
//! in [`SyncStats::sync_error`], not as errors.

use crate::conflict::{ConflictManager, ConflictRecord, Entity, ManualChoice};
use crate::error::SyncResult;
use crate::listeners::{Listeners, Subscription};
use crate::network::{NetworkMonitor, NetworkStatus};
use crate::queue::{QueueStats, SyncQueue};
use ebbsync_store::OperationStore;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tracing::info;

/// Aggregated sync state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStats {
    /// Queue counters.
    pub queue: QueueStats,
    /// Share of operations that reached a final status, 0 to 100.
    pub progress_percentage: f64,
    /// Conflicts awaiting resolution.
    pub pending_conflicts: usize,
    /// Committed network status.
    pub network: NetworkStatus,
    /// Whether a processing pass is running.
    pub is_syncing: bool,
    /// Last error that interrupted syncing, if any.
    pub sync_error: Option<String>,
}

impl SyncStats {
    fn build(queue: QueueStats, pending_conflicts: usize, network: NetworkStatus) -> Self {
        let progress_percentage = if queue.total == 0 {
            0.0
        } else {
            (queue.completed + queue.failed) as f64 / queue.total as f64 * 100.0
        };
        Self {
            progress_percentage,
            pending_conflicts,
            network,
            is_syncing: queue.is_processing,
            sync_error: queue.last_error.clone(),
            queue,
        }
    }
}

struct FacadeInner<S: OperationStore + 'static> {
    queue: SyncQueue<S>,
    conflicts: ConflictManager,
    listeners: Listeners<SyncStats>,
    subscriptions: parking_lot::Mutex<Vec<Subscription>>,
}

impl<S: OperationStore + 'static> FacadeInner<S> {
    fn stats_with(&self, queue: QueueStats) -> SyncStats {
        SyncStats::build(
            queue,
            self.conflicts.pending_count(),
            self.queue.monitor().status(),
        )
    }

    fn publish(&self, queue: QueueStats) {
        let stats = self.stats_with(queue);
        self.listeners.publish(&stats);
    }
}

/// Single entry point for the rest of the application.
///
/// Built once at the composition root. Going from offline to online starts a
/// processing pass.
pub struct SyncFacade<S: OperationStore + 'static> {
    inner: Arc<FacadeInner<S>>,
}

impl<S: OperationStore + 'static> Clone for SyncFacade<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: OperationStore + 'static> SyncFacade<S> {
    /// Wires a queue and a conflict manager together. Network events come
    /// from the queue's monitor.
    pub fn new(queue: SyncQueue<S>, conflicts: ConflictManager) -> Self {
        let inner = Arc::new(FacadeInner {
            queue,
            conflicts,
            listeners: Listeners::new(),
            subscriptions: parking_lot::Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        let on_queue = inner.queue.subscribe(move |stats| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.publish(stats.clone());
            }
        });

        let weak = Arc::downgrade(&inner);
        let on_conflicts = inner.conflicts.subscribe(move |_| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.publish(inner.queue.stats());
            }
        });

        let weak = Arc::downgrade(&inner);
        let on_network = inner.queue.monitor().subscribe(move |change| {
            let Some(inner) = Weak::upgrade(&weak) else {
                return;
            };
            if change.came_online() {
                info!("back online, starting sync");
                inner.queue.spawn_process();
            }
            inner.publish(inner.queue.stats());
        });

        inner
            .subscriptions
            .lock()
            .extend([on_queue, on_conflicts, on_network]);
        Self { inner }
    }

    /// Current aggregated state.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats_with(self.inner.queue.stats())
    }

    /// Registers a callback receiving aggregated state on every change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncStats) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(callback)
    }

    /// Runs a processing pass now and returns the resulting state.
    pub async fn force_sync_now(&self) -> SyncStats {
        self.inner.queue.process_queue().await;
        self.stats()
    }

    /// Resets failed operations and processes them again.
    pub async fn retry_failed_sync(&self) -> SyncStats {
        // Errors are already recorded in the queue's last_error.
        let _ = self.inner.queue.retry_failed().await;
        self.stats()
    }

    /// Drops failed operations.
    pub async fn clear_failed_items(&self) -> SyncStats {
        let _ = self.inner.queue.clear_failed().await;
        self.stats()
    }

    /// Copies of the conflicts awaiting resolution.
    pub fn pending_conflicts(&self) -> Vec<ConflictRecord> {
        self.inner.conflicts.pending_conflicts()
    }

    /// Resolves a pending conflict by hand.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::ConflictNotFound`] if `conflict_id` is not pending.
    pub fn manual_resolve_conflict(
        &self,
        conflict_id: &str,
        choice: ManualChoice,
    ) -> SyncResult<Entity> {
        self.inner.conflicts.manual_resolve(conflict_id, choice)
    }

    /// The underlying queue.
    pub fn queue(&self) -> &SyncQueue<S> {
        &self.inner.queue
    }

    /// The network monitor.
    pub fn monitor(&self) -> &NetworkMonitor {
        self.inner.queue.monitor()
    }

    /// The conflict manager.
    pub fn conflicts(&self) -> &ConflictManager {
        &self.inner.conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_zero_when_empty() {
        let stats = SyncStats::build(QueueStats::default(), 0, NetworkStatus::OFFLINE);
        assert_eq!(stats.progress_percentage, 0.0);
        assert!(stats.sync_error.is_none());
    }

    #[test]
    fn progress_counts_completed_and_failed() {
        let queue = QueueStats {
            pending: 2,
            completed: 1,
            failed: 1,
            total: 4,
            last_error: Some("disk full".into()),
            ..QueueStats::default()
        };
        let stats = SyncStats::build(queue, 3, NetworkStatus::OFFLINE);
        assert_eq!(stats.progress_percentage, 50.0);
        assert_eq!(stats.pending_conflicts, 3);
        assert_eq!(stats.sync_error.as_deref(), Some("disk full"));
    }
}
