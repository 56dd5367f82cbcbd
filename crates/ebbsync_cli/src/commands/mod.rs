//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod failed;
pub mod inspect;
pub mod purge;
pub mod verify;

use std::path::Path;

/// Fails unless a queue log exists at `path`.
///
/// Opening a store creates the file, which a maintenance command must not do.
pub fn require_log(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("No queue log found at {:?}", path).into());
    }
    Ok(())
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn missing_log_is_rejected() {
        let dir = ebbsync_testkit::TempLog::new();
        assert!(require_log(&dir.path()).is_err());
    }
}
