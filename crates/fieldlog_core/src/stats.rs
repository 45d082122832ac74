//! Store statistics.
//!
//! # Usage
//!
//! ```rust
//! use fieldlog_core::Store;
//! use serde_json::json;
//!
//! let store = Store::open_in_memory().unwrap();
//! store.records().insert("users", json!({"name": "Ann"})).unwrap();
//!
//! let stats = store.stats().unwrap();
//! assert_eq!(stats.table("users").unwrap().active, 1);
//! assert_eq!(stats.queue.pending, 1);
//! ```

use crate::error::CoreResult;
use crate::queue::QueueCounts;
use crate::schema;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Row counts of one synchronized table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    /// Table name.
    pub table: String,
    /// Rows without `deleted_at`.
    pub active: u64,
    /// Soft-deleted rows.
    pub deleted: u64,
}

/// Snapshot of a store's contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    /// Schema version of the image.
    pub schema_version: i64,
    /// Size of the exported image in bytes.
    pub image_bytes: usize,
    /// Per-table row counts, in schema order.
    pub tables: Vec<TableStats>,
    /// Queue items per status.
    pub queue: QueueCounts,
    /// Sync cursor, if a pull has completed.
    pub sync_cursor: Option<DateTime<Utc>>,
}

impl StoreStats {
    /// Looks up the counts of a table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableStats> {
        self.tables.iter().find(|t| t.table == name)
    }
}

impl Store {
    /// Counts active and soft-deleted rows of every synchronized table.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if a table cannot be read.
    pub fn table_stats(&self) -> CoreResult<Vec<TableStats>> {
        schema::TABLES
            .iter()
            .map(|def| {
                let row = self.query_one(
                    &format!(
                        "SELECT COUNT(*) - COUNT(deleted_at) AS active, COUNT(deleted_at) AS deleted FROM {}",
                        def.name
                    ),
                    &[],
                )?;
                let count = |name: &str| {
                    row.as_ref()
                        .and_then(|r| r.get(name))
                        .and_then(Value::as_u64)
                        .unwrap_or(0)
                };
                Ok(TableStats {
                    table: def.name.to_string(),
                    active: count("active"),
                    deleted: count("deleted"),
                })
            })
            .collect()
    }

    /// Collects a [`StoreStats`] snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the store cannot be read.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        Ok(StoreStats {
            schema_version: self.schema_version()?,
            image_bytes: self.export()?.len(),
            tables: self.table_stats()?,
            queue: self.queue().counts()?,
            sync_cursor: self.sync_cursor()?,
        })
    }
}
