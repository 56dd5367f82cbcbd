//! Property-based test generators using proptest.
//!
//! Entities are JSON objects with an `id` and an `updatedAt` timestamp in
//! epoch milliseconds. Generated field names never collide with the
//! bookkeeping fields conflict detection ignores.

use ebbsync_store::QueuedOperation;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

const RESERVED: [&str; 8] = [
    "id",
    "createdAt",
    "updatedAt",
    "timestamp",
    "lastSynced",
    "syncStatus",
    "updated_at",
    "lastModified",
];

/// Strategy for generating field names outside the reserved set.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}")
        .expect("Invalid regex")
        .prop_filter("Field name must not be reserved", |name| {
            !RESERVED.contains(&name.as_str())
        })
}

/// Strategy for generating scalar JSON values.
pub fn json_scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        prop::string::string_regex("[a-zA-Z ]{0,12}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ]
}

/// Strategy for generating field maps without bookkeeping fields.
pub fn fields_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(field_name_strategy(), json_scalar_strategy(), 0..6)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for generating entities with an id and a timestamp.
pub fn entity_strategy() -> impl Strategy<Value = Map<String, Value>> {
    ("[a-z]{1,6}", 0i64..1_000_000, fields_strategy()).prop_map(|(id, updated_at, mut fields)| {
        fields.insert("id".into(), json!(id));
        fields.insert("updatedAt".into(), json!(updated_at));
        fields
    })
}

/// Strategy for generating a local and a server copy of the same entity.
///
/// Both sides start from the same fields; the local side then overwrites,
/// adds, or removes some of them. Timestamps are drawn from a narrow range
/// so ties are common.
pub fn entity_pair_strategy() -> impl Strategy<Value = (Map<String, Value>, Map<String, Value>)> {
    (
        entity_strategy(),
        fields_strategy(),
        prop::collection::vec(field_name_strategy(), 0..3),
        0i64..5,
        0i64..5,
    )
        .prop_map(|(server, edits, removals, local_ts, server_ts)| {
            let mut local = server.clone();
            for (key, value) in edits {
                local.insert(key, value);
            }
            for key in removals {
                local.remove(&key);
            }
            let mut server = server;
            local.insert("updatedAt".into(), json!(local_ts));
            server.insert("updatedAt".into(), json!(server_ts));
            (local, server)
        })
}

/// Strategy for generating pending operations.
pub fn operation_strategy() -> impl Strategy<Value = QueuedOperation> {
    (
        prop::sample::select(vec!["create_message", "update_profile", "upload"]),
        -3i32..3,
        json_scalar_strategy(),
        0u64..10_000,
    )
        .prop_map(|(op_type, priority, payload, sequence)| {
            QueuedOperation::new(op_type, json!({ "value": payload }), priority, sequence)
        })
}
