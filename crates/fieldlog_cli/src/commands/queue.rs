//! Queue command implementation.

use super::OpenStore;
use fieldlog_core::{QueueItem, QueueStatus};
use std::path::Path;
use std::str::FromStr;

/// Lists queue items, optionally filtered by status.
pub fn list(
    path: &Path,
    status: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<QueueItem>, Box<dyn std::error::Error>> {
    let status = status.map(QueueStatus::from_str).transpose()?;
    let opened = OpenStore::existing(path)?;
    Ok(opened.store.queue().list(status, limit)?)
}

/// Runs the queue command.
pub fn run(
    path: &Path,
    status: Option<&str>,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let items = list(path, status, limit)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&items)?),
        _ => print_table(&items),
    }

    Ok(())
}

fn print_table(items: &[QueueItem]) {
    if items.is_empty() {
        println!("Queue is empty");
        return;
    }

    println!(
        "{:<36}  {:<6}  {:<18}  {:<36}  {:<9}  {:>8}  CREATED",
        "ID", "ACTION", "TABLE", "RECORD", "STATUS", "ATTEMPTS"
    );
    for item in items {
        println!(
            "{:<36}  {:<6}  {:<18}  {:<36}  {:<9}  {:>8}  {}",
            item.id,
            item.action.as_str(),
            item.table_name,
            item.record_id,
            item.status.as_str(),
            item.attempts,
            item.created_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        );
        if let Some(error) = &item.error_message {
            println!("    error: {error}");
        }
    }
    println!();
    println!("{} item(s)", items.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_image;

    #[test]
    fn lists_in_creation_order() {
        let (_dir, path) = sample_image();
        let items = list(&path, None, None).unwrap();
        let records: Vec<&str> = items.iter().map(|i| i.record_id.as_str()).collect();
        assert_eq!(records, ["u1", "u2", "u2"]);
    }

    #[test]
    fn filters_and_limits() {
        let (_dir, path) = sample_image();
        assert_eq!(list(&path, Some("pending"), Some(2)).unwrap().len(), 2);
        assert!(list(&path, Some("failed"), None).unwrap().is_empty());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let (_dir, path) = sample_image();
        let err = list(&path, Some("stuck"), None).unwrap_err();
        assert!(err.to_string().contains("unknown queue status"));
    }
}
