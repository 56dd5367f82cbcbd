//! Shared inputs for the ebbsync benchmarks.

use ebbsync_engine::Entity;
use ebbsync_store::QueuedOperation;
use rand::Rng;
use serde_json::{json, Value};

/// Random JSON payload with `fields` short string fields.
pub fn random_payload(fields: usize) -> Value {
    let mut rng = rand::thread_rng();
    let map: serde_json::Map<String, Value> = (0..fields)
        .map(|i| {
            let text: String = (0..16).map(|_| rng.gen_range('a'..='z')).collect();
            (format!("field_{}", i), Value::String(text))
        })
        .collect();
    Value::Object(map)
}

/// Pending operations spread over a few types and priorities.
pub fn generate_operations(count: usize, fields: usize) -> Vec<QueuedOperation> {
    let types = ["send_message", "update_profile", "upload"];
    (0..count)
        .map(|i| {
            QueuedOperation::new(
                types[i % types.len()],
                random_payload(fields),
                (i % 3) as i32,
                i as u64,
            )
        })
        .collect()
}

/// A local and a server copy of one entity with `fields` fields, of which
/// every `stride`-th differs. The server copy is newer.
pub fn entity_pair(fields: usize, stride: usize) -> (Entity, Entity) {
    let mut local = Entity::new();
    let mut server = Entity::new();
    for i in 0..fields {
        let key = format!("field_{}", i);
        local.insert(key.clone(), json!(i));
        let value = if stride > 0 && i % stride == 0 {
            json!(i + 1)
        } else {
            json!(i)
        };
        server.insert(key, value);
    }
    local.insert("id".into(), json!("bench"));
    server.insert("id".into(), json!("bench"));
    local.insert("updatedAt".into(), json!(1_000));
    server.insert("updatedAt".into(), json!(2_000));
    (local, server)
}
