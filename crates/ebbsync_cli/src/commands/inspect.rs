//! Inspect command implementation.

use super::{format_size, require_log};
use ebbsync_store::{LogStore, OperationStatus, OperationStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Queue log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log path.
    pub path: String,
    /// Log size in bytes.
    pub size: u64,
    /// Records replayed on open.
    pub records: usize,
    /// Superseded records still in the log.
    pub dead_records: usize,
    /// Bytes of an interrupted final write.
    pub torn_bytes: u64,
    /// Live operations.
    pub operations: usize,
    /// Operations per status.
    pub by_status: BTreeMap<String, usize>,
    /// Operations per type.
    pub by_type: BTreeMap<String, usize>,
    /// Operations per priority.
    pub by_priority: BTreeMap<i32, usize>,
}

/// Opens the log and gathers statistics.
pub fn collect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    require_log(path)?;
    let size = std::fs::metadata(path)?.len();
    let store = LogStore::open_file(path)?;
    let recovery = store.recovery();

    let mut result = InspectResult {
        path: path.display().to_string(),
        size,
        records: recovery.records,
        dead_records: store.dead_records(),
        torn_bytes: recovery.torn_bytes,
        operations: 0,
        by_status: OperationStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect(),
        by_type: BTreeMap::new(),
        by_priority: BTreeMap::new(),
    };

    for op in store.list_all()? {
        result.operations += 1;
        *result.by_status.entry(op.status.to_string()).or_default() += 1;
        *result.by_type.entry(op.op_type).or_default() += 1;
        *result.by_priority.entry(op.priority).or_default() += 1;
    }

    Ok(result)
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("ebbsync Queue Inspection");
    println!("========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Log:");
    println!("  Size:         {}", format_size(result.size));
    println!("  Records:      {}", result.records);
    println!("  Dead records: {}", result.dead_records);
    if result.torn_bytes > 0 {
        println!("  Torn tail:    {} bytes discarded", result.torn_bytes);
    }
    println!();
    println!("Operations: {}", result.operations);
    for (status, count) in &result.by_status {
        println!("  {:<11} {}", format!("{}:", status), count);
    }

    if !result.by_type.is_empty() {
        println!();
        println!("By type:");
        for (op_type, count) in &result.by_type {
            println!("  {}: {}", op_type, count);
        }
        println!();
        println!("By priority:");
        for (priority, count) in &result.by_priority {
            println!("  [{}] {}", priority, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebbsync_testkit::{operation, TempLog};

    #[test]
    fn counts_by_status_type_and_priority() {
        let log = TempLog::new();
        {
            let store = log.open().unwrap();
            store.put(&operation("upload", 1, 0)).unwrap();
            store.put(&operation("upload", 2, 1)).unwrap();
            let mut failed = operation("send_message", 1, 2);
            failed.status = OperationStatus::Failed;
            store.put(&failed).unwrap();
        }

        let result = collect(&log.path()).unwrap();
        assert_eq!(result.operations, 3);
        assert_eq!(result.records, 3);
        assert_eq!(result.by_status["pending"], 2);
        assert_eq!(result.by_status["failed"], 1);
        assert_eq!(result.by_status["completed"], 0);
        assert_eq!(result.by_type["upload"], 2);
        assert_eq!(result.by_priority[&1], 2);
        assert_eq!(result.torn_bytes, 0);
    }
}
