//! fieldlog CLI
//!
//! Maintenance tools for fieldlog store images.
//!
//! # Commands
//!
//! - `inspect` - Display table, queue and cursor statistics
//! - `verify` - Check image integrity and queue consistency
//! - `queue` - List change queue items
//! - `export` - Write a plain SQLite backup of the store
//! - `import` - Replace the store with a backup
//! - `retry-failed` - Return failed queue items to pending
//! - `purge` - Remove old completed queue items

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// fieldlog store maintenance tools.
#[derive(Parser)]
#[command(name = "fieldlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store image file
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
    /// Display table, queue and cursor statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check image integrity and queue consistency
    Verify,

    /// List change queue items
    Queue {
        /// Only show items with this status (pending, syncing, completed, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of items to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write a plain SQLite backup of the store
    Export {
        /// Backup file to write
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Replace the store with a backup
    Import {
        /// Backup file to read
        #[arg(short = 'i', long = "from")]
        from: PathBuf,
    },

    /// Return failed queue items to pending
    RetryFailed,

    /// Remove completed queue items older than the retention window
    Purge {
        /// Retention window in days
        #[arg(short, long, default_value = "7")]
        days: u32,
    },
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

    let path = cli.path.ok_or("Store image path required (--path)")?;

    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&path, &format)?,
        Commands::Verify => commands::verify::run(&path)?,
        Commands::Queue {
            status,
            limit,
            format,
        } => commands::queue::run(&path, status.as_deref(), limit, &format)?,
        Commands::Export { out } => commands::backup::export(&path, &out)?,
        Commands::Import { from } => commands::backup::import(&path, &from)?,
        Commands::RetryFailed => commands::maintenance::retry_failed(&path)?,
        Commands::Purge { days } => commands::maintenance::purge(&path, days)?,
    }

    Ok(())
}
