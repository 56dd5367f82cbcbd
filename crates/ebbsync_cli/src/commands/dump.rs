//! Dump command implementation.

use super::require_log;
use ebbsync_store::{LogStore, OperationStatus, OperationStore, QueuedOperation};
use std::path::Path;

/// Loads operations in processing order, optionally filtered by status.
pub fn collect(
    path: &Path,
    status: Option<OperationStatus>,
    limit: Option<usize>,
) -> Result<Vec<QueuedOperation>, Box<dyn std::error::Error>> {
    require_log(path)?;
    let store = LogStore::open_file(path)?;

    let mut ops: Vec<QueuedOperation> = store
        .list_all()?
        .filter(|op| status.map_or(true, |s| op.status == s))
        .collect();
    ops.sort_by_key(|op| op.order_key());
    if let Some(limit) = limit {
        ops.truncate(limit);
    }
    Ok(ops)
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    status: Option<OperationStatus>,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ops = collect(path, status, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&ops)?);
        }
        _ => {
            for op in &ops {
                print_operation(op);
            }
            println!();
            println!("{} operation(s)", ops.len());
        }
    }

    Ok(())
}

fn print_operation(op: &QueuedOperation) {
    println!(
        "{} [{}] {} priority={} attempts={} created={}",
        op.id, op.status, op.op_type, op.priority, op.attempts, op.created_at
    );
    println!("    payload: {}", op.payload);
    if let Some(error) = &op.error {
        println!("    error:   {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebbsync_testkit::{operation, TempLog};

    #[test]
    fn filters_sorts_and_limits() {
        let log = TempLog::new();
        {
            let store = log.open().unwrap();
            store.put(&operation("a", 3, 0)).unwrap();
            store.put(&operation("b", 1, 1)).unwrap();
            store.put(&operation("c", 2, 2)).unwrap();
            let mut done = operation("d", 0, 3);
            done.status = OperationStatus::Completed;
            store.put(&done).unwrap();
        }

        let pending = collect(&log.path(), Some(OperationStatus::Pending), None).unwrap();
        let types: Vec<_> = pending.iter().map(|op| op.op_type.as_str()).collect();
        assert_eq!(types, vec!["b", "c", "a"]);

        let first = collect(&log.path(), None, Some(1)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].op_type, "d");
    }
}
