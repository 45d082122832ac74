//! Local writes to synchronized tables.
//!
//! Each write stamps the audit columns and enqueues exactly one change in the
//! same transaction, so a committed mutation is never missing from the queue
//! and a queued change never describes a rolled-back mutation.

use crate::error::{CoreError, CoreResult};
use crate::queue::ChangeQueue;
use crate::schema::{self, TableDef};
use crate::store::{Store, Transaction};
use crate::value::Row;
use chrono::{DateTime, Utc};
use fieldlog_sync_protocol::{format_timestamp, parse_timestamp, ChangeAction};
use serde_json::{json, Value};

/// Columns a local write stamps itself.
const STAMPED: [&str; 4] = ["created_at", "updated_at", "deleted_at", "version"];

/// Local write API for the synchronized tables of a [`Store`].
///
/// Obtained through [`Store::records`].
#[derive(Debug, Clone, Copy)]
pub struct Records<'a> {
    store: &'a Store,
}

impl<'a> Records<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Inserts a row and enqueues a `create` change carrying it.
    ///
    /// `fields` must be an object of column values. A missing `id` is
    /// generated. Audit columns are stamped and override caller values.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidTable`] / [`CoreError::InvalidColumn`] for names
    ///   outside the schema
    /// - a SQLite error if a row with the same id exists
    pub fn insert(&self, table: &str, fields: Value) -> CoreResult<Row> {
        let def = schema::require_table(table)?;
        let mut row = columns(def, fields)?;
        for name in STAMPED {
            row.remove(name);
        }

        let id = match row.remove("id") {
            None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(_) => return Err(CoreError::invalid_change("id must be a non-empty string")),
        };

        self.store.transaction(|tx| {
            let now = format_timestamp(tx.now());
            row.insert("id".into(), json!(id));
            row.insert("created_at".into(), json!(now));
            row.insert("updated_at".into(), json!(now));
            row.insert("deleted_at".into(), Value::Null);
            row.insert("version".into(), json!(1));

            write_row(tx, def, &row, "INSERT")?;
            ChangeQueue::enqueue_in(tx, ChangeAction::Create, table, &id, Value::Object(row.clone()))?;
            Ok(row)
        })
    }

    /// Updates an active row and enqueues an `update` change carrying the
    /// merged row.
    ///
    /// `updated_at` is set to now and `version` incremented.
    ///
    /// # Errors
    ///
    /// - [`CoreError::RecordNotFound`] if the row is missing or soft-deleted
    /// - [`CoreError::InvalidColumn`] for unknown columns
    /// - [`CoreError::InvalidChange`] if `changes` tries to change the id
    pub fn update(&self, table: &str, id: &str, changes: Value) -> CoreResult<Row> {
        let def = schema::require_table(table)?;
        let mut changes = columns(def, changes)?;
        for name in STAMPED {
            changes.remove(name);
        }
        match changes.remove("id") {
            None => {}
            Some(Value::String(other)) if other == id => {}
            Some(_) => return Err(CoreError::invalid_change("the id of a record cannot change")),
        }

        self.store.transaction(|tx| {
            let mut row = fetch(tx, def, id)?
                .filter(is_active)
                .ok_or_else(|| CoreError::record_not_found(table, id))?;

            let now = format_timestamp(tx.now());
            let version = version_of(&row) + 1;
            changes.insert("updated_at".into(), json!(now));
            changes.insert("version".into(), json!(version));

            let assignments: Vec<String> = changes.keys().map(|c| format!("{c} = ?")).collect();
            let mut params: Vec<Value> = changes.values().cloned().collect();
            params.push(json!(id));
            tx.execute(
                &format!("UPDATE {table} SET {} WHERE id = ?", assignments.join(", ")),
                &params,
            )?;

            row.extend(changes);
            ChangeQueue::enqueue_in(tx, ChangeAction::Update, table, id, Value::Object(row.clone()))?;
            Ok(row)
        })
    }

    /// Soft-deletes an active row and enqueues a `delete` change.
    ///
    /// The row stays in the table with `deleted_at` set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordNotFound`] if the row is missing or already
    /// deleted.
    pub fn soft_delete(&self, table: &str, id: &str) -> CoreResult<Row> {
        let def = schema::require_table(table)?;

        self.store.transaction(|tx| {
            let mut row = fetch(tx, def, id)?
                .filter(is_active)
                .ok_or_else(|| CoreError::record_not_found(table, id))?;

            let now = format_timestamp(tx.now());
            let version = version_of(&row) + 1;
            tx.execute(
                &format!("UPDATE {table} SET deleted_at = ?, updated_at = ?, version = ? WHERE id = ?"),
                &[json!(now), json!(now), json!(version), json!(id)],
            )?;
            row.insert("deleted_at".into(), json!(now));
            row.insert("updated_at".into(), json!(now));
            row.insert("version".into(), json!(version));

            let payload = json!({
                "id": id,
                "deleted_at": now,
                "updated_at": now,
                "version": version,
            });
            ChangeQueue::enqueue_in(tx, ChangeAction::Delete, table, id, payload)?;
            Ok(row)
        })
    }

    /// Returns a row by id, including soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTable`] or a SQLite error.
    pub fn get(&self, table: &str, id: &str) -> CoreResult<Option<Row>> {
        let def = schema::require_table(table)?;
        self.store
            .query_one(&format!("SELECT * FROM {} WHERE id = ?", def.name), &[json!(id)])
    }

    /// Returns the rows of a table that are not soft-deleted, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTable`] or a SQLite error.
    pub fn list_active(&self, table: &str) -> CoreResult<Vec<Row>> {
        let def = schema::require_table(table)?;
        self.store.query(
            &format!(
                "SELECT * FROM {} WHERE deleted_at IS NULL ORDER BY created_at ASC, id ASC",
                def.name
            ),
            &[],
        )
    }
}

/// Checks that `value` is an object whose keys are columns of `def`.
pub(crate) fn columns(def: &TableDef, value: Value) -> CoreResult<Row> {
    let Value::Object(map) = value else {
        return Err(CoreError::invalid_change(format!(
            "payload for {} must be an object",
            def.name
        )));
    };
    if let Some(unknown) = map.keys().find(|k| !def.has_column(k)) {
        return Err(CoreError::invalid_column(def.name, unknown.as_str()));
    }
    Ok(map)
}

pub(crate) fn fetch(tx: &Transaction<'_>, def: &TableDef, id: &str) -> CoreResult<Option<Row>> {
    tx.query_one(&format!("SELECT * FROM {} WHERE id = ?", def.name), &[json!(id)])
}

/// Writes `row` with `verb` (`INSERT` or `INSERT OR REPLACE`).
pub(crate) fn write_row(tx: &Transaction<'_>, def: &TableDef, row: &Row, verb: &str) -> CoreResult<()> {
    let names: Vec<&str> = row.keys().map(String::as_str).collect();
    let placeholders = vec!["?"; names.len()].join(", ");
    let params: Vec<Value> = row.values().cloned().collect();
    tx.execute(
        &format!(
            "{verb} INTO {} ({}) VALUES ({placeholders})",
            def.name,
            names.join(", ")
        ),
        &params,
    )?;
    Ok(())
}

pub(crate) fn is_active(row: &Row) -> bool {
    row.get("deleted_at").map_or(true, Value::is_null)
}

pub(crate) fn timestamp_of(row: &Row, column: &str) -> Option<DateTime<Utc>> {
    row.get(column)
        .and_then(Value::as_str)
        .and_then(|text| parse_timestamp(text).ok())
}

pub(crate) fn version_of(row: &Row) -> i64 {
    row.get("version").and_then(Value::as_i64).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::queue::QueueStatus;
    use chrono::Duration;
    use fieldlog_sync_protocol::ManualClock;
    use std::sync::Arc;

    fn store() -> (Store, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_rfc3339("2024-05-01T06:00:00.000Z").unwrap());
        let store = Store::new(Config::new().clock(clock.clone())).unwrap();
        (store, clock)
    }

    #[test]
    fn insert_stamps_and_enqueues_create() {
        let (store, _) = store();
        let row = store
            .records()
            .insert("territories", json!({"id": "t1", "name": "North ridge"}))
            .unwrap();

        assert_eq!(row["created_at"], "2024-05-01T06:00:00.000Z");
        assert_eq!(row["updated_at"], row["created_at"]);
        assert_eq!(row["version"], 1);
        assert!(row["deleted_at"].is_null());

        let queued = store.queue().list(None, None).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].action, ChangeAction::Create);
        assert_eq!(queued[0].record_id, "t1");
        assert_eq!(queued[0].payload, Value::Object(row));
    }

    #[test]
    fn insert_generates_missing_id() {
        let (store, _) = store();
        let row = store.records().insert("users", json!({"name": "Ann"})).unwrap();
        let id = row["id"].as_str().unwrap();
        assert!(!id.is_empty());
        assert!(store.records().get("users", id).unwrap().is_some());
    }

    #[test]
    fn insert_rejects_unknown_column_without_enqueueing() {
        let (store, _) = store();
        let err = store
            .records()
            .insert("users", json!({"name": "Ann", "shoe_size": 44}))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidColumn { .. }));
        assert!(store.queue().is_empty().unwrap());
    }

    #[test]
    fn duplicate_insert_rolls_back_queue_item() {
        let (store, _) = store();
        let records = store.records();
        records.insert("users", json!({"id": "u1"})).unwrap();
        assert!(records.insert("users", json!({"id": "u1"})).is_err());
        assert_eq!(store.queue().len().unwrap(), 1);
    }

    #[test]
    fn update_bumps_version_and_enqueues_full_row() {
        let (store, clock) = store();
        let records = store.records();
        records.insert("users", json!({"id": "u1", "name": "Ann"})).unwrap();
        clock.advance(Duration::seconds(5));

        let row = records.update("users", "u1", json!({"email": "ann@example.com"})).unwrap();
        assert_eq!(row["version"], 2);
        assert_eq!(row["name"], "Ann");
        assert_eq!(row["updated_at"], "2024-05-01T06:00:05.000Z");
        assert_eq!(records.get("users", "u1").unwrap().unwrap(), row);

        let queued = store.queue().list(None, None).unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[1].action, ChangeAction::Update);
        assert_eq!(queued[1].payload["email"], "ann@example.com");
    }

    #[test]
    fn update_missing_or_deleted_is_not_found() {
        let (store, _) = store();
        let records = store.records();
        let err = records.update("users", "ghost", json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, CoreError::RecordNotFound { .. }));

        records.insert("users", json!({"id": "u1"})).unwrap();
        records.soft_delete("users", "u1").unwrap();
        let err = records.update("users", "u1", json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, CoreError::RecordNotFound { .. }));
    }

    #[test]
    fn update_cannot_change_id() {
        let (store, _) = store();
        let records = store.records();
        records.insert("users", json!({"id": "u1"})).unwrap();
        let err = records.update("users", "u1", json!({"id": "u2"})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidChange { .. }));
    }

    #[test]
    fn soft_delete_keeps_row_and_enqueues_delete() {
        let (store, clock) = store();
        let records = store.records();
        records.insert("media", json!({"id": "m1", "file_name": "a.jpg"})).unwrap();
        clock.advance(Duration::minutes(1));

        let row = records.soft_delete("media", "m1").unwrap();
        assert_eq!(row["deleted_at"], "2024-05-01T06:01:00.000Z");
        assert!(records.list_active("media").unwrap().is_empty());
        assert_eq!(records.get("media", "m1").unwrap().unwrap()["file_name"], "a.jpg");

        let pending = store.queue().pending(5).unwrap();
        assert_eq!(pending.last().unwrap().action, ChangeAction::Delete);
        assert_eq!(pending.last().unwrap().status, QueueStatus::Pending);
        assert_eq!(pending.last().unwrap().payload["deleted_at"], row["deleted_at"]);

        let err = records.soft_delete("media", "m1").unwrap_err();
        assert!(matches!(err, CoreError::RecordNotFound { .. }));
    }

    #[test]
    fn physical_delete_is_rejected() {
        let (store, _) = store();
        store.records().insert("users", json!({"id": "u1"})).unwrap();
        assert!(store.execute("DELETE FROM users WHERE id = 'u1'", &[]).is_err());
    }

    #[test]
    fn list_active_is_oldest_first() {
        let (store, clock) = store();
        let records = store.records();
        records.insert("territories", json!({"id": "b"})).unwrap();
        clock.advance(Duration::seconds(1));
        records.insert("territories", json!({"id": "a"})).unwrap();

        let ids: Vec<_> = records
            .list_active("territories")
            .unwrap()
            .into_iter()
            .map(|r| r["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("b"), json!("a")]);
    }
}
