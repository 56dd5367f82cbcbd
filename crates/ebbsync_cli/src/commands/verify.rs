//! Verify command implementation.

use super::require_log;
use ebbsync_store::record::{scan, LogRecord};
use ebbsync_store::{FileBackend, LogBackend, OperationId};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Size of the log in bytes.
    pub bytes: u64,
    /// Well-formed put records.
    pub puts: usize,
    /// Well-formed delete records.
    pub deletes: usize,
    /// Operations live after replay.
    pub live: usize,
    /// Bytes of an interrupted final write.
    pub torn_bytes: u64,
    /// Corruption found before the final record.
    pub error: Option<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Scans the log without replaying it into a store.
pub fn check(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    require_log(path)?;
    let backend = FileBackend::open(path)?;
    let bytes = backend.read_all()?;

    let mut result = VerifyResult {
        bytes: bytes.len() as u64,
        ..VerifyResult::default()
    };

    let log = match scan(&bytes) {
        Ok(log) => log,
        Err(e) => {
            result.error = Some(e.to_string());
            return Ok(result);
        }
    };

    let mut live: HashSet<OperationId> = HashSet::new();
    for (offset, record) in &log.records {
        debug!(offset, id = %record.operation_id(), "record ok");
        match record {
            LogRecord::Put(op) => {
                result.puts += 1;
                live.insert(op.id);
            }
            LogRecord::Delete(id) => {
                result.deletes += 1;
                live.remove(id);
            }
        }
    }
    result.live = live.len();
    result.torn_bytes = log.torn_bytes;
    Ok(result)
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying queue log at {:?}", path);
    println!();

    let result = check(path)?;
    println!("  Size:            {} bytes", result.bytes);
    println!("  Put records:     {}", result.puts);
    println!("  Delete records:  {}", result.deletes);
    println!("  Live operations: {}", result.live);
    if result.torn_bytes > 0 {
        println!(
            "  Torn tail:       {} bytes (discarded on next open)",
            result.torn_bytes
        );
    }

    println!();
    if result.is_ok() {
        println!("✓ Queue log verification passed");
        return Ok(());
    }
    if let Some(error) = &result.error {
        println!("  Error: {}", error);
    }
    println!("✗ Queue log verification failed");
    Err("Verification failed".into())
}
