//! Queue maintenance commands.

use super::OpenStore;
use chrono::Duration;
use std::path::Path;

/// Returns every failed queue item to pending. Returns the number of items.
pub fn retry_failed_items(path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let opened = OpenStore::existing(path)?;
    let retried = opened.store.queue().retry_failed()?;
    if retried > 0 {
        opened.save()?;
    }
    Ok(retried)
}

/// Removes completed queue items created more than `age` ago.
pub fn purge_older_than(path: &Path, age: Duration) -> Result<usize, Box<dyn std::error::Error>> {
    let opened = OpenStore::existing(path)?;
    let cutoff = opened
        .store
        .now()
        .checked_sub_signed(age)
        .ok_or("retention period out of range")?;
    let purged = opened.store.queue().purge_completed(cutoff)?;
    if purged > 0 {
        opened.save()?;
    }
    Ok(purged)
}

/// Runs the retry-failed command.
pub fn retry_failed(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let retried = retry_failed_items(path)?;
    println!("Returned {} failed item(s) to pending", retried);
    Ok(())
}

/// Runs the purge command.
pub fn purge(path: &Path, days: u32) -> Result<(), Box<dyn std::error::Error>> {
    let purged = purge_older_than(path, Duration::days(i64::from(days)))?;
    println!("Purged {} completed item(s) older than {} day(s)", purged, days);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_image;
    use fieldlog_core::QueueStatus;

    fn mark_all(path: &Path, status: QueueStatus) {
        let opened = OpenStore::existing(path).unwrap();
        let ids: Vec<String> = opened
            .store
            .queue()
            .list(None, None)
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        opened.store.queue().mark(&ids, status, Some("boom")).unwrap();
        opened.save().unwrap();
    }

    fn counts(path: &Path) -> fieldlog_core::QueueCounts {
        OpenStore::existing(path).unwrap().store.queue().counts().unwrap()
    }

    #[test]
    fn retry_returns_failed_items_to_pending() {
        let (_dir, path) = sample_image();
        mark_all(&path, QueueStatus::Failed);

        assert_eq!(retry_failed_items(&path).unwrap(), 3);
        assert_eq!(counts(&path).pending, 3);
        assert_eq!(retry_failed_items(&path).unwrap(), 0);
    }

    #[test]
    fn purge_keeps_recent_items() {
        let (_dir, path) = sample_image();
        mark_all(&path, QueueStatus::Completed);

        assert_eq!(purge_older_than(&path, Duration::days(7)).unwrap(), 0);
        assert_eq!(counts(&path).completed, 3);
    }

    #[test]
    fn purge_removes_only_completed_items() {
        let (_dir, path) = sample_image();
        mark_all(&path, QueueStatus::Completed);
        {
            let opened = OpenStore::existing(&path).unwrap();
            opened
                .store
                .records()
                .insert("users", serde_json::json!({"id": "u3"}))
                .unwrap();
            opened.save().unwrap();
        }

        assert_eq!(purge_older_than(&path, Duration::days(-1)).unwrap(), 3);
        let counts = counts(&path);
        assert_eq!((counts.completed, counts.pending), (0, 1));
    }
}
