//! End-to-end scenarios for the queue and the conflict manager.

use ebbsync_engine::{
    ConflictConfig, ConflictManager, ConnectivitySignal, ManualChoice, MockExecutor, MockReply,
    MonitorConfig, NetworkMonitor, QueueConfig, ResolutionStrategy, RetryConfig, StrategyConfig,
    SyncError, SyncQueue,
};
use ebbsync_store::{InMemoryBackend, LogStore, OperationStatus, OperationStore};
use ebbsync_testkit::entity;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn online_monitor() -> NetworkMonitor {
    NetworkMonitor::with_signal(
        MonitorConfig::default().with_debounce(Duration::ZERO),
        ConnectivitySignal::online(),
    )
}

async fn open_queue(retry: RetryConfig) -> SyncQueue<LogStore<InMemoryBackend>> {
    SyncQueue::open(
        LogStore::in_memory(),
        online_monitor(),
        QueueConfig::default()
            .with_retry(retry)
            .with_process_on_enqueue(false),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn priorities_execute_lowest_first() {
    let queue = open_queue(RetryConfig::immediate(3)).await;
    let mock = Arc::new(MockExecutor::new());
    queue.register_executor("send_message", mock.clone());

    for priority in [2, 1, 3] {
        queue
            .enqueue("send_message", json!({ "priority": priority }), priority)
            .await
            .unwrap();
    }

    let outcome = queue.process_queue().await;
    assert_eq!(outcome.succeeded, 3);

    let order: Vec<_> = mock
        .payloads()
        .into_iter()
        .map(|p| p["priority"].as_i64().unwrap())
        .collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[tokio::test]
async fn equal_priorities_keep_enqueue_order() {
    let queue = open_queue(RetryConfig::immediate(3)).await;
    let mock = Arc::new(MockExecutor::new());
    queue.register_executor("update_profile", mock.clone());

    for n in 0..5 {
        queue.enqueue("update_profile", json!(n), 0).await.unwrap();
    }
    queue.process_queue().await;

    assert_eq!(
        mock.payloads(),
        (0..5).map(|n| json!(n)).collect::<Vec<_>>()
    );
}

#[test]
fn last_write_wins_picks_newer_server_version() {
    let manager = ConflictManager::default();
    manager.register_strategy("profile", StrategyConfig::new(ResolutionStrategy::LastWriteWins));

    let local = entity(json!({"id": "p1", "name": "A", "updatedAt": "2024-01-01T00:00:00Z"}));
    let server = entity(json!({"id": "p1", "name": "B", "updatedAt": "2024-01-02T00:00:00Z"}));

    let conflict = manager.detect_conflict(&local, &server, "profile").unwrap();
    let resolution = manager.resolve_conflict(&conflict);

    assert!(!resolution.manual);
    assert_eq!(resolution.resolved.unwrap(), server);
    assert!(manager.pending_conflicts().is_empty());
}

#[test]
fn field_merge_only_changes_contested_field() {
    let manager = ConflictManager::default();
    manager.register_strategy("profile", StrategyConfig::new(ResolutionStrategy::FieldMerge));

    let local = entity(json!({
        "id": "p1",
        "name": "A",
        "bio": "shared",
        "avatar": "b.png",
        "syncStatus": "dirty",
        "updatedAt": "2024-01-01T00:00:00Z"
    }));
    let server = entity(json!({
        "id": "p1",
        "name": "B",
        "bio": "shared",
        "avatar": "b.png",
        "updatedAt": "2024-01-02T00:00:00Z"
    }));

    let conflict = manager.detect_conflict(&local, &server, "profile").unwrap();
    assert_eq!(
        conflict.conflicted_fields.iter().cloned().collect::<Vec<_>>(),
        vec!["name".to_string()]
    );

    let resolved = manager.resolve_conflict(&conflict).resolved.unwrap();
    assert_eq!(resolved["name"], json!("B"));
    assert_eq!(resolved["avatar"], json!("b.png"));
    assert!(!resolved.contains_key("syncStatus"));
    assert_eq!(resolved, server);
}

#[tokio::test]
async fn exhausted_retries_fail_then_retry_failed_resets() {
    let queue = open_queue(RetryConfig::immediate(3)).await;
    let mock = Arc::new(MockExecutor::with_script([
        MockReply::Transient("503".into()),
        MockReply::Transient("503".into()),
        MockReply::Transient("503".into()),
    ]));
    queue.register_executor("upload", mock.clone());
    let id = queue.enqueue("upload", json!({"file": "a.jpg"}), 0).await.unwrap();

    let outcome = queue.process_queue().await;
    assert_eq!(outcome.executed, 3);
    assert_eq!(outcome.retried, 2);
    assert_eq!(outcome.failed, 1);

    let op = queue.get(&id).unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.attempts, 3);
    assert!(op.error.as_deref().unwrap().contains("503"));

    // Offline, the reset is observable before anything is reprocessed.
    queue.monitor().set_online(false);
    assert_eq!(queue.retry_failed().await.unwrap(), 1);
    let op = queue.get(&id).unwrap();
    assert_eq!(op.status, OperationStatus::Pending);
    assert_eq!(op.attempts, 0);
    assert!(op.error.is_none());
    assert_eq!(queue.store().get(&id).unwrap().unwrap().attempts, 0);

    queue.monitor().set_online(true);
    queue.process_queue().await;
    let op = queue.get(&id).unwrap();
    assert_eq!(op.status, OperationStatus::Completed);
    assert_eq!(op.attempts, 1);
    assert_eq!(mock.call_count(), 4);
}

#[tokio::test]
async fn retry_failed_reprocesses_when_online() {
    let queue = open_queue(RetryConfig::immediate(1)).await;
    let mock = Arc::new(MockExecutor::with_script([MockReply::Permanent("422".into())]));
    queue.register_executor("upload", mock.clone());
    let id = queue.enqueue("upload", json!(null), 0).await.unwrap();

    queue.process_queue().await;
    assert_eq!(queue.get(&id).unwrap().status, OperationStatus::Failed);

    assert_eq!(queue.retry_failed().await.unwrap(), 1);
    let op = queue.get(&id).unwrap();
    assert_eq!(op.status, OperationStatus::Completed);
    assert_eq!(op.attempts, 1);
    assert_eq!(mock.call_count(), 2);
}

#[test]
fn manual_resolve_unknown_id_leaves_pending_untouched() {
    let manager = ConflictManager::new(ConflictConfig::default());
    manager.register_strategy("note", StrategyConfig::new(ResolutionStrategy::UserPrompt));
    let conflict = manager
        .detect_conflict(
            &entity(json!({"id": "n1", "text": "mine"})),
            &entity(json!({"id": "n1", "text": "theirs"})),
            "note",
        )
        .unwrap();
    manager.resolve_conflict(&conflict);
    let before = manager.pending_conflicts();

    let err = manager
        .manual_resolve("does-not-exist", ManualChoice::Server)
        .unwrap_err();
    assert!(matches!(err, SyncError::ConflictNotFound(ref id) if id == "does-not-exist"));
    assert_eq!(manager.pending_conflicts(), before);

    let data = manager.manual_resolve("n1", ManualChoice::Server).unwrap();
    assert_eq!(data["text"], json!("theirs"));
    assert!(matches!(
        manager.manual_resolve("n1", ManualChoice::Server),
        Err(SyncError::ConflictNotFound(_))
    ));
}
