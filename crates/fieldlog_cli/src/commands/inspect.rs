//! Inspect command implementation.

use super::OpenStore;
use fieldlog_core::StoreStats;
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Image path.
    pub path: String,
    /// Image file size in bytes.
    pub file_size: u64,
    /// Store contents.
    #[serde(flatten)]
    pub stats: StoreStats,
}

/// Collects the inspection result for the image at `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let opened = OpenStore::existing(path)?;
    Ok(InspectResult {
        path: path.display().to_string(),
        file_size: std::fs::metadata(path)?.len(),
        stats: opened.store.stats()?,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

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
    let stats = &result.stats;
    println!("fieldlog Store Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  File size:      {}", format_size(result.file_size));
    println!("  Image size:     {}", format_size(stats.image_bytes as u64));
    println!("  Schema version: {}", stats.schema_version);
    println!();
    println!("Tables:");
    for table in &stats.tables {
        println!(
            "  {:<18} {:>6} active, {:>6} deleted",
            table.table, table.active, table.deleted
        );
    }
    println!();
    println!("Change queue:");
    println!("  Pending:   {}", stats.queue.pending);
    println!("  Syncing:   {}", stats.queue.syncing);
    println!("  Completed: {}", stats.queue.completed);
    println!("  Failed:    {}", stats.queue.failed);
    println!();
    match stats.sync_cursor {
        Some(cursor) => println!("Last sync: {}", format_cursor(cursor)),
        None => println!("Last sync: never"),
    }
}

fn format_cursor(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_image;

    #[test]
    fn inspect_counts_rows() {
        let (_dir, path) = sample_image();
        let result = inspect(&path).unwrap();
        let users = result.stats.table("users").unwrap();
        assert_eq!((users.active, users.deleted), (1, 1));
        assert_eq!(result.stats.queue.pending, 3);
        assert!(result.file_size > result.stats.image_bytes as u64);
    }

    #[test]
    fn inspect_json_is_flat() {
        let (_dir, path) = sample_image();
        let json = serde_json::to_value(inspect(&path).unwrap()).unwrap();
        assert!(json["tables"].is_array());
        assert_eq!(json["queue"]["pending"], 3);
    }

    #[test]
    fn missing_image_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(inspect(&dir.path().join("absent.img")).is_err());
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
