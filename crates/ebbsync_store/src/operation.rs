//! Queued operations and their lifecycle status.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Wall-clock time in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// Creates a timestamp from epoch milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns epoch milliseconds.
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp moved back by `duration`, saturating.
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a queued operation.
///
/// ```text
/// Pending ──► Processing ──► Completed
///    ▲            │
///    │            ▼
///    └─────────  Failed
/// ```
///
/// `Failed → Pending` only happens through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting to be processed.
    Pending,
    /// Currently being sent to the backend.
    Processing,
    /// Delivered successfully. Terminal.
    Completed,
    /// Gave up after exhausting retries or a permanent rejection.
    Failed,
}

impl OperationStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [OperationStatus; 4] = [
        OperationStatus::Pending,
        OperationStatus::Processing,
        OperationStatus::Completed,
        OperationStatus::Failed,
    ];

    /// Returns the lowercase name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Processing => "processing",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Pending)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }

    /// Returns true for statuses nothing will move out of automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "processing" => Ok(OperationStatus::Processing),
            "completed" => Ok(OperationStatus::Completed),
            "failed" => Ok(OperationStatus::Failed),
            other => Err(format!("unknown operation status '{other}'")),
        }
    }
}

/// A replayable mutation waiting for network delivery.
///
/// # Invariants
///
/// - `id` is unique and never changes
/// - `attempts` only grows, except through an explicit retry of a failed operation
/// - `error` is set only while `status` is `Failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Unique operation ID.
    pub id: OperationId,
    /// Logical action, used to route to an executor.
    pub op_type: String,
    /// Data needed to replay the operation.
    pub payload: Value,
    /// Lower values are processed first.
    pub priority: i32,
    /// Current lifecycle status.
    pub status: OperationStatus,
    /// Processing attempts made so far.
    pub attempts: u32,
    /// When the operation was enqueued.
    pub created_at: Timestamp,
    /// When the last attempt started.
    pub last_attempt_at: Option<Timestamp>,
    /// Last failure reason.
    pub error: Option<String>,
    /// Enqueue counter, orders operations of equal priority.
    pub sequence: u64,
}

impl QueuedOperation {
    /// Creates a new pending operation.
    pub fn new(op_type: impl Into<String>, payload: Value, priority: i32, sequence: u64) -> Self {
        Self {
            id: OperationId::new(),
            op_type: op_type.into(),
            payload,
            priority,
            status: OperationStatus::Pending,
            attempts: 0,
            created_at: Timestamp::now(),
            last_attempt_at: None,
            error: None,
            sequence,
        }
    }

    /// Key the queue processes operations in: priority, then enqueue order.
    ///
    /// Wall-clock `created_at` is not part of the key; a clock stepping
    /// backwards must not let a later operation overtake an earlier one.
    pub fn order_key(&self) -> (i32, u64) {
        (self.priority, self.sequence)
    }

    /// Token the backend can deduplicate replays on.
    pub fn idempotency_key(&self) -> String {
        self.id.to_string()
    }

    /// Time of the last state-relevant activity, used for retention.
    pub fn last_activity(&self) -> Timestamp {
        self.last_attempt_at.unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_transitions() {
        use OperationStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));

        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn status_names() {
        for status in OperationStatus::ALL {
            assert_eq!(status.as_str().parse::<OperationStatus>().unwrap(), status);
        }
        assert!("done".parse::<OperationStatus>().is_err());
    }

    #[test]
    fn new_operation_is_pending() {
        let op = QueuedOperation::new("send_message", json!({"text": "hi"}), 1, 7);
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempts, 0);
        assert_eq!(op.sequence, 7);
        assert!(op.error.is_none());
        assert_eq!(op.idempotency_key(), op.id.to_string());
    }

    #[test]
    fn order_key_is_priority_then_sequence() {
        let a = QueuedOperation::new("t", json!(null), 1, 1);
        let b = QueuedOperation::new("t", json!(null), 1, 2);
        assert!(a.order_key() < b.order_key());

        let c = QueuedOperation::new("t", json!(null), 0, 3);
        assert!(c.order_key() < a.order_key());
    }

    #[test]
    fn order_key_ignores_clock_steps() {
        let mut create = QueuedOperation::new("t", json!("create"), 0, 0);
        let mut update = QueuedOperation::new("t", json!("update"), 0, 1);
        create.created_at = Timestamp::from_millis(2_000);
        update.created_at = Timestamp::from_millis(1_000);

        let mut ops = vec![update, create];
        ops.sort_by_key(QueuedOperation::order_key);
        let payloads: Vec<_> = ops.iter().map(|op| op.payload.clone()).collect();
        assert_eq!(payloads, vec![json!("create"), json!("update")]);
    }

    #[test]
    fn legal_transitions() {
        use OperationStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn timestamp_saturating_sub() {
        let t = Timestamp::from_millis(5_000);
        assert_eq!(t.saturating_sub(Duration::from_secs(2)), Timestamp::from_millis(3_000));
        assert_eq!(
            Timestamp::from_millis(i64::MIN).saturating_sub(Duration::from_secs(1)),
            Timestamp::from_millis(i64::MIN)
        );
    }
}
