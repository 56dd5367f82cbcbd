//! The sync queue.
//!
//! Owns the lifecycle of queued operations. Every state change is persisted
//! to the [`OperationStore`] before it becomes visible in memory, so stats
//! never run ahead of what a restart would recover.
//!
//! ```text
//! enqueue ──► Pending ──► Processing ──► Completed
//!               ▲  ▲          │
//!               │  └─(backoff)┤ transient, attempts left
//!               │             ▼
//!               └─ retry ── Failed
//! ```

use crate::config::QueueConfig;
use crate::error::{SyncError, SyncResult};
use crate::executor::{ExecuteRequest, OperationExecutor};
use crate::listeners::{Listeners, Subscription};
use crate::network::NetworkMonitor;
use ebbsync_store::{OperationId, OperationStatus, OperationStore, QueuedOperation, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Operations waiting to be processed.
    pub pending: usize,
    /// Operations with an attempt in flight.
    pub processing: usize,
    /// Delivered operations not yet purged.
    pub completed: usize,
    /// Operations that gave up.
    pub failed: usize,
    /// All operations.
    pub total: usize,
    /// Operation count per type.
    pub by_type: BTreeMap<String, usize>,
    /// Operation count per priority.
    pub by_priority: BTreeMap<i32, usize>,
    /// Whether a processing pass is running.
    pub is_processing: bool,
    /// Last error that interrupted processing.
    pub last_error: Option<String>,
    /// When the last processing pass finished.
    pub last_processed_at: Option<Timestamp>,
}

/// Summary of one `process_queue` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Attempts started.
    pub executed: usize,
    /// Attempts that completed their operation.
    pub succeeded: usize,
    /// Attempts that failed transiently and were rescheduled.
    pub retried: usize,
    /// Attempts that moved their operation to `Failed`.
    pub failed: usize,
    /// True if the call found a pass already running and did nothing.
    pub coalesced: bool,
    /// True if the pass stopped because the device is offline.
    pub stopped_offline: bool,
    /// Passes run by this call. More than one when other calls arrived
    /// while a pass was running.
    pub passes: usize,
}

impl ProcessOutcome {
    fn absorb(&mut self, pass: ProcessOutcome) {
        self.executed += pass.executed;
        self.succeeded += pass.succeeded;
        self.retried += pass.retried;
        self.failed += pass.failed;
        self.stopped_offline = pass.stopped_offline;
        self.passes += 1;
    }
}

/// Moves `op` to `next`, refusing transitions the lifecycle does not allow.
fn transition(op: &mut QueuedOperation, next: OperationStatus) -> SyncResult<()> {
    if !op.status.can_transition_to(next) {
        return Err(SyncError::InvalidTransition {
            id: op.id,
            from: op.status,
            to: next,
        });
    }
    op.status = next;
    Ok(())
}

/// Resumes an operation a crash left `Processing`. An interrupted final
/// attempt counts against the budget like any other.
fn recover_interrupted(op: &mut QueuedOperation, max_attempts: u32) -> SyncResult<()> {
    if op.attempts >= max_attempts {
        transition(op, OperationStatus::Failed)?;
        op.error = Some("interrupted during final attempt".to_string());
    } else {
        transition(op, OperationStatus::Pending)?;
    }
    Ok(())
}

struct QueueState {
    ops: HashMap<OperationId, QueuedOperation>,
    not_before: HashMap<OperationId, Instant>,
    next_sequence: u64,
    last_error: Option<String>,
    last_processed_at: Option<Timestamp>,
}

impl QueueState {
    fn commit(&mut self, op: QueuedOperation) {
        debug_assert!(
            self.ops.get(&op.id).map_or(true, |prev| {
                prev.status == op.status || prev.status.can_transition_to(op.status)
            }),
            "illegal status transition committed for {}",
            op.id
        );
        if op.status != OperationStatus::Pending {
            self.not_before.remove(&op.id);
        }
        self.ops.insert(op.id, op);
    }

    fn with_status(&self, status: OperationStatus) -> Vec<QueuedOperation> {
        let mut ops: Vec<QueuedOperation> = self
            .ops
            .values()
            .filter(|op| op.status == status)
            .cloned()
            .collect();
        ops.sort_by_key(QueuedOperation::order_key);
        ops
    }

    /// Next operation to attempt: the first pending one in priority order
    /// whose backoff has elapsed and whose type has no earlier operation
    /// still backing off.
    fn next_eligible(&self, now: Instant) -> Option<QueuedOperation> {
        let mut pending: Vec<&QueuedOperation> = self
            .ops
            .values()
            .filter(|op| op.status == OperationStatus::Pending)
            .collect();
        pending.sort_by_key(|op| op.order_key());

        let mut blocked: HashSet<&str> = HashSet::new();
        for op in pending {
            let deferred = self.not_before.get(&op.id).is_some_and(|at| *at > now);
            if deferred {
                blocked.insert(op.op_type.as_str());
            } else if !blocked.contains(op.op_type.as_str()) {
                return Some(op.clone());
            }
        }
        None
    }

    fn earliest_deferral(&self, now: Instant) -> Option<Instant> {
        self.not_before
            .iter()
            .filter(|(id, _)| {
                self.ops
                    .get(*id)
                    .is_some_and(|op| op.status == OperationStatus::Pending)
            })
            .map(|(_, at)| *at)
            .filter(|at| *at > now)
            .min()
    }

    fn stats(&self, is_processing: bool) -> QueueStats {
        let mut stats = QueueStats {
            total: self.ops.len(),
            is_processing,
            last_error: self.last_error.clone(),
            last_processed_at: self.last_processed_at,
            ..QueueStats::default()
        };
        for op in self.ops.values() {
            match op.status {
                OperationStatus::Pending => stats.pending += 1,
                OperationStatus::Processing => stats.processing += 1,
                OperationStatus::Completed => stats.completed += 1,
                OperationStatus::Failed => stats.failed += 1,
            }
            *stats.by_type.entry(op.op_type.clone()).or_default() += 1;
            *stats.by_priority.entry(op.priority).or_default() += 1;
        }
        stats
    }
}

struct QueueInner<S> {
    store: Arc<S>,
    monitor: NetworkMonitor,
    config: QueueConfig,
    executors: RwLock<HashMap<String, Arc<dyn OperationExecutor>>>,
    state: Mutex<QueueState>,
    processing: AtomicBool,
    rerun: AtomicBool,
    listeners: Listeners<QueueStats>,
    wakeup: Mutex<Option<JoinHandle<()>>>,
}

impl<S> Drop for QueueInner<S> {
    fn drop(&mut self) {
        if let Some(task) = self.wakeup.get_mut().take() {
            task.abort();
        }
    }
}

/// Clears the processing flag when a pass ends, even by panic or cancellation.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Durable, network-aware operation queue.
///
/// Cloning yields another handle to the same queue. At most one processing
/// pass runs at a time; a `process_queue` call made while one is running
/// returns immediately with [`ProcessOutcome::coalesced`] set, and the
/// running pass goes round once more before it finishes.
pub struct SyncQueue<S: OperationStore + 'static> {
    inner: Arc<QueueInner<S>>,
}

impl<S: OperationStore + 'static> Clone for SyncQueue<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: OperationStore + 'static> SyncQueue<S> {
    /// Opens a queue over `store`, recovering every stored operation.
    ///
    /// Operations left `Processing` by a crash go back to `Pending` with
    /// their attempt count kept, or to `Failed` if that attempt was their
    /// last.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or a recovered operation
    /// cannot be written back.
    pub async fn open(store: S, monitor: NetworkMonitor, config: QueueConfig) -> SyncResult<Self> {
        let store = Arc::new(store);
        let loader = Arc::clone(&store);
        let max_attempts = config.retry.max_attempts;
        let (ops, requeued) = tokio::task::spawn_blocking(move || -> SyncResult<_> {
            let mut ops = Vec::new();
            let mut requeued = 0usize;
            for mut op in loader.list_all()? {
                if op.status == OperationStatus::Processing {
                    recover_interrupted(&mut op, max_attempts)?;
                    loader.put(&op)?;
                    requeued += 1;
                }
                ops.push(op);
            }
            Ok((ops, requeued))
        })
        .await??;

        let next_sequence = ops.iter().map(|op| op.sequence + 1).max().unwrap_or(0);
        let state = QueueState {
            ops: ops.into_iter().map(|op| (op.id, op)).collect(),
            not_before: HashMap::new(),
            next_sequence,
            last_error: None,
            last_processed_at: None,
        };
        info!(
            operations = state.ops.len(),
            requeued, "sync queue opened"
        );

        Ok(Self {
            inner: Arc::new(QueueInner {
                store,
                monitor,
                config,
                executors: RwLock::new(HashMap::new()),
                state: Mutex::new(state),
                processing: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                listeners: Listeners::new(),
                wakeup: Mutex::new(None),
            }),
        })
    }

    /// Registers the executor for an operation type, replacing any earlier one.
    pub fn register_executor(&self, op_type: impl Into<String>, executor: Arc<dyn OperationExecutor>) {
        let op_type = op_type.into();
        debug!(op_type = %op_type, "registered executor");
        self.inner.executors.write().insert(op_type, executor);
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    /// The network monitor this queue consults.
    pub fn monitor(&self) -> &NetworkMonitor {
        &self.inner.monitor
    }

    /// The queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Queues a new operation and returns its id.
    ///
    /// Never waits on the network. When online and `process_on_enqueue` is
    /// set, a processing pass is started in the background.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the operation could not be
    /// stored; nothing is queued in that case.
    pub async fn enqueue(
        &self,
        op_type: impl Into<String>,
        payload: Value,
        priority: i32,
    ) -> SyncResult<OperationId> {
        let sequence = {
            let mut state = self.inner.state.lock();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            sequence
        };
        let op = QueuedOperation::new(op_type, payload, priority, sequence);
        let id = op.id;

        self.persist(op.clone()).await?;
        debug!(operation_id = %id, op_type = %op.op_type, priority, "operation enqueued");
        self.inner.state.lock().commit(op);
        self.notify();

        if self.inner.config.process_on_enqueue && self.inner.monitor.is_online() {
            self.spawn_process();
        }
        Ok(id)
    }

    /// Looks an operation up by id.
    pub fn get(&self, id: &OperationId) -> Option<QueuedOperation> {
        self.inner.state.lock().ops.get(id).cloned()
    }

    /// Copies of all operations with `status`, in processing order.
    pub fn operations(&self, status: OperationStatus) -> Vec<QueuedOperation> {
        self.inner.state.lock().with_status(status)
    }

    /// Returns true while a processing pass is running.
    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::SeqCst)
    }

    /// Starts a processing pass on the current runtime without waiting for it.
    ///
    /// Returns false if called outside a tokio runtime.
    pub fn spawn_process(&self) -> bool {
        let Ok(handle) = Handle::try_current() else {
            debug!("no runtime available, processing pass not started");
            return false;
        };
        let queue = self.clone();
        handle.spawn(async move {
            queue.process_queue().await;
        });
        true
    }

    /// Runs a processing pass, repeated while other calls were coalesced
    /// into it.
    ///
    /// Executes eligible operations one at a time while the monitor reports
    /// online. Errors never escape: persistence failures abort the pass and
    /// are reported through [`QueueStats::last_error`].
    pub async fn process_queue(&self) -> ProcessOutcome {
        let inner = &self.inner;
        inner.rerun.store(true, Ordering::SeqCst);

        let mut outcome = ProcessOutcome::default();
        loop {
            if inner
                .processing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                if outcome.passes == 0 {
                    debug!("processing pass already running, coalescing");
                    outcome.coalesced = true;
                }
                return outcome;
            }
            inner.rerun.store(false, Ordering::SeqCst);

            let pass = {
                let _guard = PassGuard(&inner.processing);
                self.notify();
                self.run_pass().await
            };

            if let Err(err) = self.purge_expired().await {
                self.record_error(&err);
            }
            inner.state.lock().last_processed_at = Some(Timestamp::now());
            self.schedule_wakeup();
            self.notify();

            info!(
                executed = pass.executed,
                succeeded = pass.succeeded,
                retried = pass.retried,
                failed = pass.failed,
                stopped_offline = pass.stopped_offline,
                "processing pass finished"
            );
            outcome.absorb(pass);

            // A call coalesced into this pass may have queued work the pass
            // no longer saw.
            if !inner.rerun.swap(false, Ordering::SeqCst) {
                return outcome;
            }
            debug!("processing requested during pass, running again");
        }
    }

    async fn run_pass(&self) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();

        if let Err(err) = self.requeue_orphans().await {
            self.record_error(&err);
            return outcome;
        }

        loop {
            if !self.inner.monitor.is_online() {
                debug!("offline, stopping processing pass");
                outcome.stopped_offline = true;
                break;
            }
            let next = self.inner.state.lock().next_eligible(Instant::now());
            let Some(op) = next else {
                break;
            };
            if let Err(err) = self.attempt(op, &mut outcome).await {
                self.record_error(&err);
                return outcome;
            }
        }

        self.inner.state.lock().last_error = None;
        outcome
    }

    /// Resumes operations stranded in `Processing` by an interrupted pass.
    async fn requeue_orphans(&self) -> SyncResult<()> {
        let orphans = self.inner.state.lock().with_status(OperationStatus::Processing);
        let max_attempts = self.inner.config.retry.max_attempts;
        for mut op in orphans {
            recover_interrupted(&mut op, max_attempts)?;
            self.persist(op.clone()).await?;
            debug!(operation_id = %op.id, status = %op.status, "recovered interrupted operation");
            self.inner.state.lock().commit(op);
        }
        Ok(())
    }

    async fn attempt(&self, mut op: QueuedOperation, outcome: &mut ProcessOutcome) -> SyncResult<()> {
        transition(&mut op, OperationStatus::Processing)?;
        op.attempts += 1;
        op.last_attempt_at = Some(Timestamp::now());
        op.error = None;
        self.persist(op.clone()).await?;
        self.inner.state.lock().commit(op.clone());
        self.notify();
        outcome.executed += 1;

        let result = self.execute(&op).await;
        let max_attempts = self.inner.config.retry.max_attempts;
        let mut backoff = None;

        let next = match result {
            Ok(_) => {
                debug!(operation_id = %op.id, attempts = op.attempts, "operation completed");
                OperationStatus::Completed
            }
            Err(err) if err.is_retryable() && op.attempts < max_attempts => {
                let delay = self.inner.config.retry.delay_for_attempt(op.attempts);
                warn!(
                    operation_id = %op.id,
                    attempts = op.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retry scheduled"
                );
                backoff = Some(Instant::now() + delay);
                OperationStatus::Pending
            }
            Err(err) => {
                warn!(
                    operation_id = %op.id,
                    attempts = op.attempts,
                    error = %err,
                    "operation failed"
                );
                op.error = Some(err.to_string());
                OperationStatus::Failed
            }
        };
        transition(&mut op, next)?;

        let status = op.status;
        self.persist(op.clone()).await?;
        {
            let mut state = self.inner.state.lock();
            if let Some(at) = backoff {
                state.not_before.insert(op.id, at);
            }
            state.commit(op);
        }
        match status {
            OperationStatus::Completed => outcome.succeeded += 1,
            OperationStatus::Pending => outcome.retried += 1,
            _ => outcome.failed += 1,
        }
        self.notify();
        Ok(())
    }

    /// Runs the registered executor for `op`, time-boxed.
    ///
    /// The call runs on its own task so a panicking executor is reported as
    /// an error instead of unwinding through the queue.
    async fn execute(&self, op: &QueuedOperation) -> SyncResult<Value> {
        let executor = self
            .inner
            .executors
            .read()
            .get(&op.op_type)
            .cloned()
            .ok_or_else(|| SyncError::NoExecutor(op.op_type.clone()))?;

        let request = ExecuteRequest {
            operation_id: op.id,
            idempotency_key: op.idempotency_key(),
            op_type: op.op_type.clone(),
            payload: op.payload.clone(),
            attempt: op.attempts,
        };
        let timeout = self.inner.config.execute_timeout;
        let mut task = tokio::spawn(async move { executor.execute(request).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined?,
            Err(_) => {
                task.abort();
                Err(SyncError::Timeout(timeout))
            }
        }
    }

    /// Moves every failed operation back to `Pending` with its attempts
    /// reset, then runs a processing pass. Returns how many were reset.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if a reset cannot be stored.
    /// Operations reset before the failure stay reset.
    pub async fn retry_failed(&self) -> SyncResult<usize> {
        let failed = self.inner.state.lock().with_status(OperationStatus::Failed);
        let count = failed.len();

        for mut op in failed {
            transition(&mut op, OperationStatus::Pending)?;
            op.attempts = 0;
            op.error = None;
            if let Err(err) = self.persist(op.clone()).await {
                self.record_error(&err);
                self.notify();
                return Err(err);
            }
            self.inner.state.lock().commit(op);
        }

        info!(count, "failed operations reset for retry");
        self.notify();
        self.process_queue().await;
        Ok(count)
    }

    /// Deletes every failed operation without retrying. Returns how many
    /// were removed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if a deletion cannot be stored.
    pub async fn clear_failed(&self) -> SyncResult<usize> {
        let failed = self.inner.state.lock().with_status(OperationStatus::Failed);
        let count = failed.len();

        for op in failed {
            let store = Arc::clone(&self.inner.store);
            let id = op.id;
            let deleted = tokio::task::spawn_blocking(move || store.delete(&id))
                .await
                .map_err(SyncError::from)
                .and_then(|r| r.map_err(SyncError::from));
            if let Err(err) = deleted {
                self.record_error(&err);
                self.notify();
                return Err(err);
            }
            self.inner.state.lock().ops.remove(&id);
        }

        info!(count, "failed operations cleared");
        self.notify();
        Ok(count)
    }

    /// Deletes completed and failed operations past their retention.
    /// Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if a deletion cannot be stored.
    /// Operations deleted before the failure leave memory as well.
    pub async fn purge_expired(&self) -> SyncResult<usize> {
        let now = Timestamp::now();
        let rules = [
            (self.inner.config.completed_retention, OperationStatus::Completed),
            (self.inner.config.failed_retention, OperationStatus::Failed),
        ];

        let mut removed = 0;
        for (retention, status) in rules {
            let Some(retention) = retention else {
                continue;
            };
            let cutoff = now.saturating_sub(retention);
            let store = Arc::clone(&self.inner.store);
            let deleted =
                tokio::task::spawn_blocking(move || store.delete_older_than(cutoff, &[status]))
                    .await
                    .map_err(SyncError::from)
                    .and_then(|r| r.map_err(SyncError::from));
            match deleted {
                Ok(count) => {
                    removed += count;
                    self.inner
                        .state
                        .lock()
                        .ops
                        .retain(|_, op| !(op.status == status && op.last_activity() < cutoff));
                }
                Err(err) => {
                    let dropped = self.forget_deleted(status, cutoff).await;
                    if removed + dropped > 0 {
                        self.notify();
                    }
                    return Err(err);
                }
            }
        }

        if removed > 0 {
            info!(removed, "expired operations purged");
            self.notify();
        }
        Ok(removed)
    }

    /// Drops from memory the expired operations a partially failed purge
    /// already removed from the store. Returns how many were dropped.
    async fn forget_deleted(&self, status: OperationStatus, cutoff: Timestamp) -> usize {
        let candidates: Vec<OperationId> = self
            .inner
            .state
            .lock()
            .ops
            .values()
            .filter(|op| op.status == status && op.last_activity() < cutoff)
            .map(|op| op.id)
            .collect();

        let store = Arc::clone(&self.inner.store);
        let gone = tokio::task::spawn_blocking(move || {
            candidates
                .into_iter()
                .filter(|id| matches!(store.get(id), Ok(None)))
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_default();

        let mut state = self.inner.state.lock();
        for id in &gone {
            state.ops.remove(id);
            state.not_before.remove(id);
        }
        gone.len()
    }

    /// Consistent snapshot of the queue.
    pub fn stats(&self) -> QueueStats {
        self.inner.state.lock().stats(self.is_processing())
    }

    /// Registers a callback receiving stats after every state change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&QueueStats) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(callback)
    }

    async fn persist(&self, op: QueuedOperation) -> SyncResult<()> {
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || store.put(&op)).await??;
        Ok(())
    }

    fn record_error(&self, err: &SyncError) {
        warn!(error = %err, "processing interrupted");
        self.inner.state.lock().last_error = Some(err.to_string());
    }

    fn notify(&self) {
        let stats = self.stats();
        self.inner.listeners.publish(&stats);
    }

    /// Arms a single timer for the earliest backoff expiry, replacing any
    /// previous one.
    fn schedule_wakeup(&self) {
        let earliest = self.inner.state.lock().earliest_deferral(Instant::now());

        let mut slot = self.inner.wakeup.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let Some(deadline) = earliest else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            return;
        };

        debug!("retry wake-up scheduled");
        let weak: Weak<QueueInner<S>> = Arc::downgrade(&self.inner);
        *slot = Some(handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // Detach our own handle so the pass below does not abort us.
            drop(inner.wakeup.lock().take());
            SyncQueue { inner }.process_queue().await;
        }));
    }
}

impl<S: OperationStore + 'static> std::fmt::Debug for SyncQueue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitorConfig, RetryConfig};
    use crate::executor::{MockExecutor, MockReply};
    use crate::network::ConnectivitySignal;
    use ebbsync_store::LogStore;
    use ebbsync_store::InMemoryBackend;
    use serde_json::json;
    use std::time::Duration;

    fn online() -> NetworkMonitor {
        NetworkMonitor::with_signal(
            MonitorConfig::default().with_debounce(Duration::ZERO),
            ConnectivitySignal::online(),
        )
    }

    fn config() -> QueueConfig {
        QueueConfig::default()
            .with_retry(RetryConfig::immediate(3))
            .with_process_on_enqueue(false)
    }

    async fn queue(monitor: NetworkMonitor) -> SyncQueue<LogStore<InMemoryBackend>> {
        SyncQueue::open(LogStore::in_memory(), monitor, config())
            .await
            .unwrap()
    }

    #[test]
    fn completed_operation_cannot_move_back() {
        let mut op = QueuedOperation::new("t", json!(null), 0, 0);
        transition(&mut op, OperationStatus::Processing).unwrap();
        transition(&mut op, OperationStatus::Completed).unwrap();

        for next in [OperationStatus::Pending, OperationStatus::Processing, OperationStatus::Failed] {
            let err = transition(&mut op, next).unwrap_err();
            assert!(matches!(
                err,
                SyncError::InvalidTransition { from: OperationStatus::Completed, .. }
            ));
        }
        assert_eq!(op.status, OperationStatus::Completed);
    }

    #[test]
    fn interrupted_attempt_respects_budget() {
        let mut op = QueuedOperation::new("t", json!(null), 0, 0);
        op.status = OperationStatus::Processing;
        op.attempts = 2;
        recover_interrupted(&mut op, 3).unwrap();
        assert_eq!(op.status, OperationStatus::Pending);

        op.status = OperationStatus::Processing;
        op.attempts = 3;
        recover_interrupted(&mut op, 3).unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert!(op.error.is_some());
    }

    #[tokio::test]
    async fn enqueue_persists_before_returning() {
        let queue = queue(online()).await;
        let id = queue.enqueue("send_message", json!({"text": "hi"}), 1).await.unwrap();

        let stored = queue.store().get(&id).unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Pending);
        assert_eq!(stored.payload, json!({"text": "hi"}));
        assert_eq!(queue.stats().pending, 1);
    }

    #[tokio::test]
    async fn sequences_increase() {
        let queue = queue(online()).await;
        let a = queue.enqueue("t", json!(1), 0).await.unwrap();
        let b = queue.enqueue("t", json!(2), 0).await.unwrap();
        assert!(queue.get(&a).unwrap().sequence < queue.get(&b).unwrap().sequence);
    }

    #[tokio::test]
    async fn success_marks_completed() {
        let queue = queue(online()).await;
        let mock = Arc::new(MockExecutor::new());
        queue.register_executor("t", mock.clone());
        let id = queue.enqueue("t", json!({"n": 1}), 0).await.unwrap();

        let outcome = queue.process_queue().await;
        assert_eq!(outcome.executed, 1);
        assert_eq!(outcome.succeeded, 1);

        let op = queue.get(&id).unwrap();
        assert_eq!(op.status, OperationStatus::Completed);
        assert_eq!(op.attempts, 1);
        assert_eq!(mock.calls()[0].idempotency_key, id.to_string());
        assert_eq!(mock.calls()[0].attempt, 1);
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let queue = queue(online()).await;
        let mock = Arc::new(MockExecutor::with_script([MockReply::Permanent("bad".into())]));
        queue.register_executor("t", mock.clone());
        let id = queue.enqueue("t", json!(null), 0).await.unwrap();

        let outcome = queue.process_queue().await;
        assert_eq!(outcome.failed, 1);
        let op = queue.get(&id).unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(op.attempts, 1);
        assert!(op.error.unwrap().contains("bad"));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_executor_fails_operation() {
        let queue = queue(online()).await;
        let id = queue.enqueue("unknown", json!(null), 0).await.unwrap();
        queue.process_queue().await;

        let op = queue.get(&id).unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert!(op.error.unwrap().contains("unknown"));
    }

    #[tokio::test]
    async fn offline_pass_executes_nothing() {
        let monitor = NetworkMonitor::new(MonitorConfig::default().with_debounce(Duration::ZERO));
        let queue = queue(monitor).await;
        let mock = Arc::new(MockExecutor::new());
        queue.register_executor("t", mock.clone());
        queue.enqueue("t", json!(null), 0).await.unwrap();

        let outcome = queue.process_queue().await;
        assert!(outcome.stopped_offline);
        assert_eq!(outcome.executed, 0);
        assert_eq!(mock.call_count(), 0);
        assert_eq!(queue.stats().pending, 1);
    }

    #[tokio::test]
    async fn stats_break_down_by_type_and_priority() {
        let queue = queue(online()).await;
        queue.enqueue("a", json!(null), 1).await.unwrap();
        queue.enqueue("a", json!(null), 2).await.unwrap();
        queue.enqueue("b", json!(null), 2).await.unwrap();

        let stats = queue.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_type.get("a"), Some(&2));
        assert_eq!(stats.by_type.get("b"), Some(&1));
        assert_eq!(stats.by_priority.get(&2), Some(&2));
        assert!(!stats.is_processing);
    }

    #[tokio::test]
    async fn clear_failed_removes_from_store() {
        let queue = queue(online()).await;
        let id = queue.enqueue("nobody", json!(null), 0).await.unwrap();
        queue.process_queue().await;
        assert_eq!(queue.stats().failed, 1);

        assert_eq!(queue.clear_failed().await.unwrap(), 1);
        assert_eq!(queue.stats().total, 0);
        assert!(queue.store().get(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_removes_old_completed() {
        let monitor = online();
        let queue = SyncQueue::open(
            LogStore::in_memory(),
            monitor,
            config().with_completed_retention(None),
        )
        .await
        .unwrap();
        queue.register_executor("t", Arc::new(MockExecutor::new()));
        queue.enqueue("t", json!(null), 0).await.unwrap();
        queue.process_queue().await;
        assert_eq!(queue.stats().completed, 1);
        assert_eq!(queue.purge_expired().await.unwrap(), 0);

        let queue = SyncQueue::open(
            Arc::clone(queue.store()),
            queue.monitor().clone(),
            config().with_completed_retention(Some(Duration::ZERO)),
        )
        .await
        .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(queue.purge_expired().await.unwrap(), 1);
        assert_eq!(queue.stats().total, 0);
    }
}
