//! Network execution boundary.
//!
//! The queue never talks to a backend itself. For each operation type the
//! application registers an [`OperationExecutor`] that replays the payload
//! against its backend and classifies failures as transient or permanent.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use ebbsync_store::OperationId;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

/// Everything an executor needs to replay one operation.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// The operation being executed.
    pub operation_id: OperationId,
    /// Token the backend should deduplicate replays on.
    pub idempotency_key: String,
    /// Operation type.
    pub op_type: String,
    /// Operation payload.
    pub payload: Value,
    /// Attempt number, starting at 1.
    pub attempt: u32,
}

/// Replays operations of one type against the backend.
///
/// Delivery is at-least-once: a crash between a successful call and the
/// queue recording it leads to the same request being sent again. Executors
/// must therefore be idempotent or forward [`ExecuteRequest::idempotency_key`]
/// to the backend.
///
/// Return [`SyncError::TransientNetwork`] for failures worth retrying and
/// [`SyncError::PermanentRejection`] for requests the backend will never
/// accept.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Sends one operation to the backend.
    async fn execute(&self, request: ExecuteRequest) -> SyncResult<Value>;
}

/// Executor backed by an async closure. See [`executor_fn`].
pub struct FnExecutor<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Wraps an async closure as an [`OperationExecutor`].
///
/// ```ignore
/// queue.register_executor("send_message", executor_fn(|req| async move {
///     client.send(&req.idempotency_key, req.payload).await
/// }));
/// ```
pub fn executor_fn<F, Fut>(f: F) -> FnExecutor<F, Fut>
where
    F: Fn(ExecuteRequest) -> Fut + Send + Sync,
    Fut: Future<Output = SyncResult<Value>> + Send,
{
    FnExecutor {
        f,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> OperationExecutor for FnExecutor<F, Fut>
where
    F: Fn(ExecuteRequest) -> Fut + Send + Sync,
    Fut: Future<Output = SyncResult<Value>> + Send,
{
    async fn execute(&self, request: ExecuteRequest) -> SyncResult<Value> {
        (self.f)(request).await
    }
}

/// Scripted reply of a [`MockExecutor`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Succeed with a value.
    Ok(Value),
    /// Fail with a retryable error.
    Transient(String),
    /// Fail with a rejection.
    Permanent(String),
    /// Sleep, then succeed with `null`. Used to exercise timeouts.
    Delay(Duration),
}

/// A mock executor for testing.
///
/// Replies are consumed in order; once the script runs out every call
/// succeeds with `null`. Every request is recorded.
#[derive(Debug, Default)]
pub struct MockExecutor {
    script: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<ExecuteRequest>>,
}

impl MockExecutor {
    /// Creates a mock that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock with a reply script.
    pub fn with_script(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Appends a reply to the script.
    pub fn push_reply(&self, reply: MockReply) {
        self.script.lock().push_back(reply);
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<ExecuteRequest> {
        self.calls.lock().clone()
    }

    /// Number of requests received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Payloads received so far, in call order.
    pub fn payloads(&self) -> Vec<Value> {
        self.calls.lock().iter().map(|c| c.payload.clone()).collect()
    }
}

#[async_trait]
impl OperationExecutor for MockExecutor {
    async fn execute(&self, request: ExecuteRequest) -> SyncResult<Value> {
        self.calls.lock().push(request);
        let reply = self.script.lock().pop_front();
        match reply {
            None => Ok(Value::Null),
            Some(MockReply::Ok(value)) => Ok(value),
            Some(MockReply::Transient(msg)) => Err(SyncError::TransientNetwork(msg)),
            Some(MockReply::Permanent(msg)) => Err(SyncError::PermanentRejection(msg)),
            Some(MockReply::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(Value::Null)
            }
        }
    }
}
