//! The change queue.
//!
//! A durable, ordered journal of local mutations awaiting push, stored as
//! rows of the `sync_queue` table inside the store itself so that a queue
//! item and the mutation it describes commit atomically.
//!
//! ## Item lifecycle
//!
//! ```text
//!            push starts            push accepted
//! pending ───────────────► syncing ──────────────► completed ──► purged
//!    ▲                        │                                 (retention)
//!    │  attempts < ceiling    │ push failed
//!    └──────────────────── failed
//!       or retry_failed()
//! ```
//!
//! Only `status`, `attempts`, `last_attempt` and `error_message` ever change;
//! a trigger rejects updates to the item contents.

use crate::error::{CoreError, CoreResult};
use crate::schema;
use crate::store::{Store, Transaction};
use crate::value::Row;
use chrono::{DateTime, Utc};
use fieldlog_sync_protocol::{format_timestamp, parse_timestamp, ChangeAction, ChangeItem};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Processing state of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Waiting to be pushed.
    Pending,
    /// Part of a push in flight.
    Syncing,
    /// Accepted by the endpoint.
    Completed,
    /// Last push attempt failed.
    Failed,
}

impl QueueStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Syncing, Self::Completed, Self::Failed];

    /// Returns the stored name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::invalid_change(format!("unknown queue status: {s}")))
    }
}

/// A queued local mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    /// Item id, also used as the change id on the wire.
    pub id: String,
    /// Kind of mutation.
    pub action: ChangeAction,
    /// Target table.
    pub table_name: String,
    /// Affected record.
    pub record_id: String,
    /// Row contents at mutation time.
    pub payload: Value,
    /// Processing state.
    pub status: QueueStatus,
    /// Number of failed push attempts.
    pub attempts: u32,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// Time of the last push attempt.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error from the last failed attempt.
    pub error_message: Option<String>,
}

impl QueueItem {
    /// Converts to the wire representation.
    #[must_use]
    pub fn to_change(&self) -> ChangeItem {
        ChangeItem {
            id: self.id.clone(),
            action: self.action,
            table_name: self.table_name.clone(),
            record_id: self.record_id.clone(),
            payload: self.payload.clone(),
        }
    }

    fn from_row(row: &Row) -> CoreResult<Self> {
        let text = |name: &str| -> CoreResult<String> {
            row.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| CoreError::invalid_change(format!("queue row missing {name}")))
        };
        let optional_text =
            |name: &str| row.get(name).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            id: text("id")?,
            action: text("action")?.parse()?,
            table_name: text("table_name")?,
            record_id: text("record_id")?,
            payload: serde_json::from_str(&text("payload")?)?,
            status: text("status")?.parse()?,
            attempts: row
                .get("attempts")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            created_at: parse_timestamp(&text("created_at")?)?,
            last_attempt: optional_text("last_attempt")
                .map(|t| parse_timestamp(&t))
                .transpose()?,
            error_message: optional_text("error_message"),
        })
    }
}

/// Number of queue items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    /// Items waiting to be pushed.
    pub pending: usize,
    /// Items in a push in flight.
    pub syncing: usize,
    /// Items accepted by the endpoint and not yet purged.
    pub completed: usize,
    /// Items whose last push failed.
    pub failed: usize,
}

impl QueueCounts {
    /// Total number of items.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.syncing + self.completed + self.failed
    }
}

const SELECT_ITEMS: &str = "SELECT id, action, table_name, record_id, payload, status, attempts,
        created_at, last_attempt, error_message
 FROM sync_queue";

const ORDER: &str = "ORDER BY created_at ASC, rowid ASC";

/// Access to the change queue of a [`Store`].
///
/// Obtained through [`Store::queue`].
#[derive(Debug, Clone, Copy)]
pub struct ChangeQueue<'a> {
    store: &'a Store,
}

impl<'a> ChangeQueue<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Appends a pending item in its own transaction.
    ///
    /// No deduplication is performed: two calls for the same record produce
    /// two items.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidTable`] if `table_name` is not synchronized
    /// - [`CoreError::InvalidChange`] if `record_id` is empty
    pub fn enqueue(
        &self,
        action: ChangeAction,
        table_name: &str,
        record_id: &str,
        payload: Value,
    ) -> CoreResult<QueueItem> {
        self.store
            .transaction(|tx| Self::enqueue_in(tx, action, table_name, record_id, payload))
    }

    /// Appends a pending item inside the caller's transaction.
    ///
    /// The item commits or rolls back together with the caller's mutation.
    ///
    /// # Errors
    ///
    /// Same as [`enqueue`](Self::enqueue).
    pub fn enqueue_in(
        tx: &Transaction<'_>,
        action: ChangeAction,
        table_name: &str,
        record_id: &str,
        payload: Value,
    ) -> CoreResult<QueueItem> {
        schema::require_table(table_name)?;
        if record_id.is_empty() {
            return Err(CoreError::invalid_change("record id must not be empty"));
        }

        let item = QueueItem {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            table_name: table_name.to_string(),
            record_id: record_id.to_string(),
            payload,
            status: QueueStatus::Pending,
            attempts: 0,
            created_at: tx.now(),
            last_attempt: None,
            error_message: None,
        };

        tx.execute(
            "INSERT INTO sync_queue
                 (id, action, table_name, record_id, payload, status, attempts, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
            &[
                json!(item.id),
                json!(item.action.as_str()),
                json!(item.table_name),
                json!(item.record_id),
                json!(item.payload.to_string()),
                json!(item.status.as_str()),
                json!(format_timestamp(item.created_at)),
            ],
        )?;

        tracing::debug!(
            id = %item.id,
            action = %item.action,
            target = %format!("{}/{}", item.table_name, item.record_id),
            "change enqueued"
        );
        Ok(item)
    }

    /// Returns the items due for push, oldest first.
    ///
    /// Includes every `pending` item and every `failed` item with fewer than
    /// `max_attempts` attempts. Items created at the same instant keep their
    /// insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn pending(&self, max_attempts: u32) -> CoreResult<Vec<QueueItem>> {
        self.select(
            &format!(
                "{SELECT_ITEMS} WHERE status = 'pending' OR (status = 'failed' AND attempts < ?) {ORDER}"
            ),
            &[json!(max_attempts)],
        )
    }

    /// Sets the status (and error message) of the given items.
    ///
    /// `completed` and `failed` also stamp `last_attempt`. Returns the number
    /// of items updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails; no item is changed then.
    pub fn mark(&self, ids: &[String], status: QueueStatus, error: Option<&str>) -> CoreResult<usize> {
        let stamps_attempt = matches!(status, QueueStatus::Completed | QueueStatus::Failed);
        self.store.transaction(|tx| {
            let now = json!(format_timestamp(tx.now()));
            let mut updated = 0;
            for id in ids {
                updated += if stamps_attempt {
                    tx.execute(
                        "UPDATE sync_queue SET status = ?, error_message = ?, last_attempt = ? WHERE id = ?",
                        &[json!(status.as_str()), json!(error), now.clone(), json!(id)],
                    )?
                } else {
                    tx.execute(
                        "UPDATE sync_queue SET status = ?, error_message = ? WHERE id = ?",
                        &[json!(status.as_str()), json!(error), json!(id)],
                    )?
                };
            }
            Ok(updated)
        })
    }

    /// Marks items failed, incrementing their attempt counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails; no item is changed then.
    pub fn mark_failed(&self, ids: &[String], error: &str) -> CoreResult<usize> {
        self.store.transaction(|tx| {
            let now = json!(format_timestamp(tx.now()));
            let mut updated = 0;
            for id in ids {
                updated += tx.execute(
                    "UPDATE sync_queue
                     SET status = 'failed', attempts = attempts + 1, error_message = ?, last_attempt = ?
                     WHERE id = ?",
                    &[json!(error), now.clone(), json!(id)],
                )?;
            }
            Ok(updated)
        })
    }

    /// Deletes `completed` items created before `older_than`.
    ///
    /// Returns the number of items removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn purge_completed(&self, older_than: DateTime<Utc>) -> CoreResult<usize> {
        let purged = self.store.execute(
            "DELETE FROM sync_queue WHERE status = 'completed' AND created_at < ?",
            &[json!(format_timestamp(older_than))],
        )?;
        if purged > 0 {
            tracing::debug!(purged, "purged completed queue items");
        }
        Ok(purged)
    }

    /// Returns `syncing` items to `pending`.
    ///
    /// Items stay `syncing` only if the process stopped during a push.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn requeue_interrupted(&self) -> CoreResult<usize> {
        let requeued = self.store.execute(
            "UPDATE sync_queue SET status = 'pending' WHERE status = 'syncing'",
            &[],
        )?;
        if requeued > 0 {
            tracing::info!(requeued, "requeued items from an interrupted push");
        }
        Ok(requeued)
    }

    /// Returns every `failed` item to `pending`, regardless of attempts.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn retry_failed(&self) -> CoreResult<usize> {
        self.store.execute(
            "UPDATE sync_queue SET status = 'pending' WHERE status = 'failed'",
            &[],
        )
    }

    /// Looks up an item by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn get(&self, id: &str) -> CoreResult<Option<QueueItem>> {
        Ok(self
            .select(&format!("{SELECT_ITEMS} WHERE id = ?"), &[json!(id)])?
            .into_iter()
            .next())
    }

    /// Lists items oldest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn list(&self, status: Option<QueueStatus>, limit: Option<usize>) -> CoreResult<Vec<QueueItem>> {
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        match status {
            Some(status) => self.select(
                &format!("{SELECT_ITEMS} WHERE status = ? {ORDER} LIMIT ?"),
                &[json!(status.as_str()), json!(limit)],
            ),
            None => self.select(&format!("{SELECT_ITEMS} {ORDER} LIMIT ?"), &[json!(limit)]),
        }
    }

    /// Returns the number of items in the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.counts()?.total())
    }

    /// Returns true if the queue holds no items.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Counts items per status.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn counts(&self) -> CoreResult<QueueCounts> {
        let rows = self.store.query(
            "SELECT status, COUNT(*) AS n FROM sync_queue GROUP BY status",
            &[],
        )?;
        let mut counts = QueueCounts::default();
        for row in rows {
            let n = row.get("n").and_then(Value::as_u64).unwrap_or(0) as usize;
            match row.get("status").and_then(Value::as_str).map(str::parse::<QueueStatus>) {
                Some(Ok(QueueStatus::Pending)) => counts.pending = n,
                Some(Ok(QueueStatus::Syncing)) => counts.syncing = n,
                Some(Ok(QueueStatus::Completed)) => counts.completed = n,
                Some(Ok(QueueStatus::Failed)) => counts.failed = n,
                _ => {}
            }
        }
        Ok(counts)
    }

    fn select(&self, sql: &str, params: &[Value]) -> CoreResult<Vec<QueueItem>> {
        self.store
            .query(sql, params)?
            .iter()
            .map(QueueItem::from_row)
            .collect()
    }
}
