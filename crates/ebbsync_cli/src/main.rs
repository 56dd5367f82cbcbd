//! ebbsync CLI
//!
//! Command-line tools for ebbsync queue logs.
//!
//! # Commands
//!
//! - `inspect` - Display queue statistics
//! - `dump` - List queued operations
//! - `verify` - Verify log integrity
//! - `compact` - Rewrite the log to its live operations
//! - `purge` - Remove old completed or failed operations
//! - `retry-failed` - Reset failed operations to pending
//! - `clear-failed` - Remove failed operations

mod commands;

use clap::{Parser, Subcommand};
use ebbsync_store::OperationStatus;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ebbsync command-line queue tools.
#[derive(Parser)]
#[command(name = "ebbsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the queue log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display queue statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List queued operations in processing order
    Dump {
        /// Only show operations with this status
        #[arg(short, long)]
        status: Option<OperationStatus>,

        /// Maximum number of operations to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify log integrity
    Verify,

    /// Rewrite the log to its live operations
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Remove completed operations older than a cutoff
    Purge {
        /// Age in seconds past which operations are removed
        #[arg(long)]
        older_than_secs: u64,

        /// Also remove failed operations
        #[arg(long)]
        failed: bool,
    },

    /// Reset failed operations to pending
    RetryFailed,

    /// Remove failed operations
    ClearFailed,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Queue log path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Dump {
            status,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Queue log path required for dump")?;
            commands::dump::run(&path, status, limit, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Queue log path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Queue log path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Purge {
            older_than_secs,
            failed,
        } => {
            let path = cli.path.ok_or("Queue log path required for purge")?;
            commands::purge::run(&path, older_than_secs, failed)?;
        }
        Commands::RetryFailed => {
            let path = cli.path.ok_or("Queue log path required for retry-failed")?;
            commands::failed::retry(&path)?;
        }
        Commands::ClearFailed => {
            let path = cli.path.ok_or("Queue log path required for clear-failed")?;
            commands::failed::clear(&path)?;
        }
        Commands::Version => {
            println!("ebbsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ebbsync engine v{}", ebbsync_engine::VERSION);
        }
    }

    Ok(())
}
