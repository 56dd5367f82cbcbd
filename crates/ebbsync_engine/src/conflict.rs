//! Conflict detection and resolution.
//!
//! A conflict is a divergence between the local and the server copy of one
//! entity. Entities are JSON objects; the fields in [`METADATA_FIELDS`] never
//! count as divergence. Each entity type resolves with a configured
//! [`ResolutionStrategy`], falling back to last-write-wins.

use crate::config::{ConflictConfig, TieBreak};
use crate::error::{SyncError, SyncResult};
use crate::listeners::{Listeners, Subscription};
use chrono::DateTime;
use ebbsync_store::Timestamp;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// A snapshot of an entity.
pub type Entity = Map<String, Value>;

/// Custom merge function. Its output replaces whatever the strategy produced.
pub type MergeFn = Arc<dyn Fn(&ConflictRecord) -> Entity + Send + Sync>;

/// Bookkeeping fields ignored when comparing versions.
pub const METADATA_FIELDS: [&str; 6] = [
    "id",
    "createdAt",
    "updatedAt",
    "timestamp",
    "lastSynced",
    "syncStatus",
];

/// Fields holding an entity's modification time, in lookup order.
const TIMESTAMP_FIELDS: [&str; 4] = ["updatedAt", "updated_at", "timestamp", "lastModified"];

/// How conflicts of an entity type are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionStrategy {
    /// The newer version wins wholesale.
    #[default]
    LastWriteWins,
    /// Start from the server version and take each conflicted field from the
    /// newer side.
    FieldMerge,
    /// Leave the conflict pending until resolved by hand.
    UserPrompt,
}

impl ResolutionStrategy {
    /// Returns the camel-case name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::LastWriteWins => "lastWriteWins",
            ResolutionStrategy::FieldMerge => "fieldMerge",
            ResolutionStrategy::UserPrompt => "userPrompt",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy registered for an entity type.
#[derive(Clone, Default)]
pub struct StrategyConfig {
    /// Built-in strategy.
    pub strategy: ResolutionStrategy,
    /// Overrides the strategy's output when set.
    pub custom_merge: Option<MergeFn>,
}

impl StrategyConfig {
    /// Creates a configuration for a built-in strategy.
    pub fn new(strategy: ResolutionStrategy) -> Self {
        Self {
            strategy,
            custom_merge: None,
        }
    }

    /// Sets a custom merge function.
    pub fn with_custom_merge<F>(mut self, merge: F) -> Self
    where
        F: Fn(&ConflictRecord) -> Entity + Send + Sync + 'static,
    {
        self.custom_merge = Some(Arc::new(merge));
        self
    }
}

impl fmt::Debug for StrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyConfig")
            .field("strategy", &self.strategy)
            .field("custom_merge", &self.custom_merge.is_some())
            .finish()
    }
}

/// Which side of a conflict wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The local copy.
    Local,
    /// The server copy.
    Server,
}

/// A detected divergence between two versions of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Entity id, or a generated id if neither version has one.
    pub id: String,
    /// Entity type, selects the strategy.
    pub entity_type: String,
    /// Local snapshot.
    pub local_version: Entity,
    /// Server snapshot.
    pub server_version: Entity,
    /// Local modification time in epoch milliseconds.
    pub local_timestamp: i64,
    /// Server modification time in epoch milliseconds.
    pub server_timestamp: i64,
    /// Non-metadata fields whose values differ. Never empty.
    pub conflicted_fields: BTreeSet<String>,
    /// When the conflict was detected.
    pub detected_at: Timestamp,
}

impl ConflictRecord {
    /// The side with the newer timestamp, `tie_break` deciding equal ones.
    pub fn newer_side(&self, tie_break: TieBreak) -> Side {
        match self.local_timestamp.cmp(&self.server_timestamp) {
            std::cmp::Ordering::Greater => Side::Local,
            std::cmp::Ordering::Less => Side::Server,
            std::cmp::Ordering::Equal => match tie_break {
                TieBreak::PreferServer => Side::Server,
                TieBreak::PreferLocal => Side::Local,
            },
        }
    }

    /// The snapshot of one side.
    pub fn version(&self, side: Side) -> &Entity {
        match side {
            Side::Local => &self.local_version,
            Side::Server => &self.server_version,
        }
    }
}

/// Choice made when resolving a conflict by hand.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualChoice {
    /// Keep the local version.
    Local,
    /// Keep the server version.
    Server,
    /// Use caller-supplied data.
    Custom(Entity),
}

impl ManualChoice {
    fn as_str(&self) -> &'static str {
        match self {
            ManualChoice::Local => "local",
            ManualChoice::Server => "server",
            ManualChoice::Custom(_) => "custom",
        }
    }
}

/// What produced a resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedBy {
    /// A built-in strategy.
    Strategy(ResolutionStrategy),
    /// The registered custom merge function.
    CustomMerge,
    /// A manual choice.
    Manual(ManualChoice),
}

impl ResolvedBy {
    /// Key under which the resolution is counted in [`ConflictStats::by_strategy`].
    pub fn stats_key(&self) -> &'static str {
        match self {
            ResolvedBy::Strategy(strategy) => strategy.as_str(),
            ResolvedBy::CustomMerge => "custom",
            ResolvedBy::Manual(_) => "manual",
        }
    }
}

/// Outcome of resolving a conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Conflict id.
    pub conflict_id: String,
    /// Resolved entity. `None` when awaiting a manual decision.
    pub resolved: Option<Entity>,
    /// True if the conflict needs a manual decision.
    pub manual: bool,
    /// What produced the outcome.
    pub resolved_by: ResolvedBy,
}

/// Snapshot of conflict manager counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictStats {
    /// Conflicts resolved so far, automatically or by hand.
    pub total_resolved: u64,
    /// Conflicts waiting for resolution.
    pub pending: usize,
    /// Resolved conflicts per entity type.
    pub by_entity_type: BTreeMap<String, u64>,
    /// Resolved conflicts per strategy name.
    pub by_strategy: BTreeMap<String, u64>,
}

/// Reads an entity's id field.
pub fn entity_id(entity: &Entity) -> Option<String> {
    match entity.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads an entity's modification time in epoch milliseconds.
///
/// Integer fields are milliseconds, string fields are RFC 3339 or decimal
/// milliseconds. An entity without a readable timestamp reads as 0.
pub fn entity_timestamp(entity: &Entity) -> i64 {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|field| entity.get(*field))
        .find_map(parse_timestamp)
        .unwrap_or(0)
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .ok()
            .or_else(|| s.parse::<i64>().ok()),
        _ => None,
    }
}

/// Names of non-metadata fields whose values differ between two entities.
///
/// A field present on only one side differs.
pub fn conflicted_fields(local: &Entity, server: &Entity) -> BTreeSet<String> {
    local
        .keys()
        .chain(server.keys())
        .filter(|key| !METADATA_FIELDS.contains(&key.as_str()))
        .filter(|key| local.get(*key) != server.get(*key))
        .cloned()
        .collect()
}

struct ConflictState {
    strategies: HashMap<String, StrategyConfig>,
    pending: Vec<ConflictRecord>,
    history: VecDeque<ConflictRecord>,
    total_resolved: u64,
    by_entity_type: BTreeMap<String, u64>,
    by_strategy: BTreeMap<String, u64>,
}

impl ConflictState {
    fn stats(&self) -> ConflictStats {
        ConflictStats {
            total_resolved: self.total_resolved,
            pending: self.pending.len(),
            by_entity_type: self.by_entity_type.clone(),
            by_strategy: self.by_strategy.clone(),
        }
    }

    fn record_resolution(&mut self, entity_type: &str, by: &ResolvedBy) {
        self.total_resolved += 1;
        *self.by_entity_type.entry(entity_type.to_string()).or_default() += 1;
        *self.by_strategy.entry(by.stats_key().to_string()).or_default() += 1;
    }

    fn take_pending(&mut self, id: &str) -> Option<ConflictRecord> {
        let index = self.pending.iter().position(|c| c.id == id)?;
        Some(self.pending.remove(index))
    }

    /// Removes `conflict` if it is still the pending entry for its id. A
    /// later detection of the same entity stays pending.
    fn take_exact(&mut self, conflict: &ConflictRecord) -> bool {
        match self.pending.iter().position(|c| c == conflict) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }
}

struct ConflictInner {
    config: ConflictConfig,
    state: RwLock<ConflictState>,
    listeners: Listeners<ConflictStats>,
}

/// Detects and resolves conflicts between local and server entities.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct ConflictManager {
    inner: Arc<ConflictInner>,
}

impl ConflictManager {
    /// Creates a manager with no registered strategies.
    pub fn new(config: ConflictConfig) -> Self {
        Self {
            inner: Arc::new(ConflictInner {
                config,
                state: RwLock::new(ConflictState {
                    strategies: HashMap::new(),
                    pending: Vec::new(),
                    history: VecDeque::new(),
                    total_resolved: 0,
                    by_entity_type: BTreeMap::new(),
                    by_strategy: BTreeMap::new(),
                }),
                listeners: Listeners::new(),
            }),
        }
    }

    /// Sets the strategy for an entity type, replacing any earlier one.
    pub fn register_strategy(&self, entity_type: impl Into<String>, config: StrategyConfig) {
        let entity_type = entity_type.into();
        debug!(entity_type = %entity_type, strategy = %config.strategy, "registered conflict strategy");
        self.inner.state.write().strategies.insert(entity_type, config);
    }

    /// The strategy used for an entity type.
    pub fn strategy_for(&self, entity_type: &str) -> ResolutionStrategy {
        self.strategy_config(entity_type).strategy
    }

    fn strategy_config(&self, entity_type: &str) -> StrategyConfig {
        self.inner
            .state
            .read()
            .strategies
            .get(entity_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Compares two versions of an entity.
    ///
    /// Returns `None` when no field outside the metadata set differs.
    /// Otherwise records the conflict in history and in the pending set,
    /// replacing a pending conflict with the same id.
    pub fn detect_conflict(
        &self,
        local: &Entity,
        server: &Entity,
        entity_type: &str,
    ) -> Option<ConflictRecord> {
        let fields = conflicted_fields(local, server);
        if fields.is_empty() {
            return None;
        }

        let id = entity_id(local)
            .or_else(|| entity_id(server))
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let conflict = ConflictRecord {
            id,
            entity_type: entity_type.to_string(),
            local_version: local.clone(),
            server_version: server.clone(),
            local_timestamp: entity_timestamp(local),
            server_timestamp: entity_timestamp(server),
            conflicted_fields: fields,
            detected_at: Timestamp::now(),
        };

        let stats = {
            let mut state = self.inner.state.write();
            state.history.push_back(conflict.clone());
            while state.history.len() > self.inner.config.history_limit {
                state.history.pop_front();
            }
            match state.pending.iter_mut().find(|c| c.id == conflict.id) {
                Some(existing) => *existing = conflict.clone(),
                None => state.pending.push(conflict.clone()),
            }
            state.stats()
        };

        debug!(
            conflict_id = %conflict.id,
            entity_type,
            fields = conflict.conflicted_fields.len(),
            "conflict detected"
        );
        self.inner.listeners.publish(&stats);
        Some(conflict)
    }

    /// Resolves a conflict with its entity type's strategy.
    ///
    /// A `UserPrompt` outcome leaves the conflict pending; any other outcome
    /// removes it from the pending set and counts it in the stats. A record
    /// that is no longer pending, because it was resolved already or detected
    /// again since, still yields its data but changes neither. Resolution is
    /// deterministic: the same conflict always yields the same data.
    pub fn resolve_conflict(&self, conflict: &ConflictRecord) -> Resolution {
        let config = self.strategy_config(&conflict.entity_type);

        let (resolved, resolved_by) = match &config.custom_merge {
            Some(merge) => (Some(merge(conflict)), ResolvedBy::CustomMerge),
            None => (
                self.apply_strategy(config.strategy, conflict),
                ResolvedBy::Strategy(config.strategy),
            ),
        };
        let manual = resolved.is_none();

        if manual {
            debug!(conflict_id = %conflict.id, "conflict awaits manual resolution");
        } else {
            let stats = {
                let mut state = self.inner.state.write();
                if state.take_exact(conflict) {
                    state.record_resolution(&conflict.entity_type, &resolved_by);
                    Some(state.stats())
                } else {
                    None
                }
            };
            match stats {
                Some(stats) => {
                    debug!(
                        conflict_id = %conflict.id,
                        resolved_by = resolved_by.stats_key(),
                        "conflict resolved"
                    );
                    self.inner.listeners.publish(&stats);
                }
                None => debug!(conflict_id = %conflict.id, "conflict not pending, nothing recorded"),
            }
        }

        Resolution {
            conflict_id: conflict.id.clone(),
            resolved,
            manual,
            resolved_by,
        }
    }

    fn apply_strategy(
        &self,
        strategy: ResolutionStrategy,
        conflict: &ConflictRecord,
    ) -> Option<Entity> {
        let newer = conflict.newer_side(self.inner.config.tie_break);
        match strategy {
            ResolutionStrategy::LastWriteWins => Some(conflict.version(newer).clone()),
            ResolutionStrategy::FieldMerge => {
                let mut merged = conflict.server_version.clone();
                if newer == Side::Local {
                    for field in &conflict.conflicted_fields {
                        match conflict.local_version.get(field) {
                            Some(value) => {
                                merged.insert(field.clone(), value.clone());
                            }
                            None => {
                                merged.remove(field);
                            }
                        }
                    }
                }
                Some(merged)
            }
            ResolutionStrategy::UserPrompt => None,
        }
    }

    /// Resolves a pending conflict by hand and returns the chosen data.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConflictNotFound`] if no pending conflict has
    /// `conflict_id`; the pending set is left unchanged.
    pub fn manual_resolve(&self, conflict_id: &str, choice: ManualChoice) -> SyncResult<Entity> {
        let (data, stats) = {
            let mut state = self.inner.state.write();
            let conflict = state
                .take_pending(conflict_id)
                .ok_or_else(|| SyncError::ConflictNotFound(conflict_id.to_string()))?;
            let data = match &choice {
                ManualChoice::Local => conflict.local_version,
                ManualChoice::Server => conflict.server_version,
                ManualChoice::Custom(entity) => entity.clone(),
            };
            state.record_resolution(&conflict.entity_type, &ResolvedBy::Manual(choice.clone()));
            (data, state.stats())
        };

        info!(conflict_id, choice = choice.as_str(), "conflict resolved manually");
        self.inner.listeners.publish(&stats);
        Ok(data)
    }

    /// Copies of the pending conflicts, oldest first.
    pub fn pending_conflicts(&self) -> Vec<ConflictRecord> {
        self.inner.state.read().pending.clone()
    }

    /// Number of pending conflicts.
    pub fn pending_count(&self) -> usize {
        self.inner.state.read().pending.len()
    }

    /// Copies of the detected conflicts still in history, oldest first.
    pub fn history(&self) -> Vec<ConflictRecord> {
        self.inner.state.read().history.iter().cloned().collect()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ConflictStats {
        self.inner.state.read().stats()
    }

    /// Registers a callback receiving stats after every detection and resolution.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConflictStats) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(callback)
    }
}

impl Default for ConflictManager {
    fn default() -> Self {
        Self::new(ConflictConfig::default())
    }
}

impl fmt::Debug for ConflictManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictManager")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
