//! Compact command implementation.

use super::{format_size, require_log};
use ebbsync_store::{CompactionStats, LogStore};
use std::path::Path;

/// Compacts the log, or reports what compaction would drop.
pub fn compact(path: &Path, dry_run: bool) -> Result<CompactionStats, Box<dyn std::error::Error>> {
    require_log(path)?;
    let store = LogStore::open_file(path)?;

    if dry_run {
        let bytes = std::fs::metadata(path)?.len();
        return Ok(CompactionStats {
            bytes_before: bytes,
            bytes_after: bytes,
            records_dropped: store.dead_records(),
        });
    }
    Ok(store.compact()?)
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting queue log at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let stats = compact(path, dry_run)?;
    if dry_run {
        println!("  Dead records: {} (would be dropped)", stats.records_dropped);
        return Ok(());
    }

    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    println!("  Records dropped: {}", stats.records_dropped);
    println!("  Size before:     {}", format_size(stats.bytes_before));
    println!("  Size after:      {}", format_size(stats.bytes_after));
    println!(
        "  Space saved:     {} ({:.1}%)",
        format_size(saved),
        if stats.bytes_before > 0 {
            saved as f64 / stats.bytes_before as f64 * 100.0
        } else {
            0.0
        }
    );
    Ok(())
}
