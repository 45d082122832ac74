//! Applying pulled changes to the store.

use crate::error::{CoreError, CoreResult};
use crate::records::{columns, fetch, is_active, timestamp_of, version_of, write_row};
use crate::schema::{self, TableDef};
use crate::store::{Store, Transaction};
use crate::value::Row;
use fieldlog_sync_protocol::{
    format_timestamp, parse_timestamp, ChangeAction, ChangeItem, Conflict, ConflictPolicy,
};
use serde_json::{json, Value};

/// What applying a remote change did.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The record did not exist locally and was inserted.
    Inserted,
    /// The local row was replaced by a remote row at least as new.
    Replaced,
    /// The local row was newer but the policy let the remote row win.
    Overwrote(Conflict),
    /// The local row was newer and was kept.
    KeptLocal(Conflict),
    /// The local row was soft-deleted.
    Deleted,
    /// Nothing changed (unknown or already deleted record).
    Unchanged,
}

impl ApplyOutcome {
    /// Returns true if the store was modified.
    #[must_use]
    pub fn changed_store(&self) -> bool {
        matches!(
            self,
            Self::Inserted | Self::Replaced | Self::Overwrote(_) | Self::Deleted
        )
    }

    /// Returns the conflict detected while applying, if any.
    #[must_use]
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Self::Overwrote(c) | Self::KeptLocal(c) => Some(c),
            _ => None,
        }
    }
}

impl Store {
    /// Applies a change pulled from the remote endpoint.
    ///
    /// `create` and `update` upsert the payload as the row; `delete` sets
    /// `deleted_at` on an existing active row. Table and column names are
    /// checked against the schema before any SQL is built. Applying never
    /// enqueues a change.
    ///
    /// When the local row is strictly newer than the payload (by
    /// `updated_at`, then `version`) `policy` decides which side wins; the
    /// conflict is reported either way.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidTable`] / [`CoreError::InvalidColumn`] for names
    ///   outside the schema
    /// - [`CoreError::InvalidChange`] for a malformed payload
    pub fn apply_remote(&self, change: &ChangeItem, policy: ConflictPolicy) -> CoreResult<ApplyOutcome> {
        let def = schema::require_table(&change.table_name)?;
        if change.record_id.is_empty() {
            return Err(CoreError::invalid_change("record id must not be empty"));
        }

        let outcome = self.transaction(|tx| match change.action {
            ChangeAction::Create | ChangeAction::Update => upsert(tx, def, change, policy),
            ChangeAction::Delete => delete(tx, def, change),
        })?;

        match &outcome {
            ApplyOutcome::KeptLocal(conflict) => {
                tracing::info!(target_record = %conflict, "kept newer local row");
            }
            ApplyOutcome::Overwrote(conflict) => {
                tracing::info!(target_record = %conflict, "remote row overwrote newer local row");
            }
            other => {
                tracing::trace!(target_record = %change.target(), outcome = ?other, "applied remote change");
            }
        }
        Ok(outcome)
    }
}

fn upsert(
    tx: &Transaction<'_>,
    def: &TableDef,
    change: &ChangeItem,
    policy: ConflictPolicy,
) -> CoreResult<ApplyOutcome> {
    let mut row = columns(def, change.payload.clone())?;
    match row.get("id") {
        None | Some(Value::Null) => {
            row.insert("id".into(), json!(change.record_id));
        }
        Some(Value::String(id)) if *id == change.record_id => {}
        Some(_) => {
            return Err(CoreError::invalid_change(format!(
                "payload id does not match {}",
                change.target()
            )))
        }
    }

    let now = json!(format_timestamp(tx.now()));
    let local = fetch(tx, def, &change.record_id)?;

    let (outcome, created_at) = match &local {
        None => (ApplyOutcome::Inserted, now.clone()),
        Some(local) => {
            let mut conflict = Conflict::new(
                def.name,
                change.record_id.as_str(),
                (timestamp_of(local, "updated_at"), version_of(local)),
                (timestamp_of(&row, "updated_at"), version_of(&row)),
                change.payload.clone(),
            );
            let outcome = if conflict.remote_is_newer_or_equal() {
                ApplyOutcome::Replaced
            } else {
                policy.resolve(&mut conflict);
                if !conflict.accepts_remote() {
                    return Ok(ApplyOutcome::KeptLocal(conflict));
                }
                ApplyOutcome::Overwrote(conflict)
            };
            let created_at = local.get("created_at").cloned().unwrap_or_else(|| now.clone());
            (outcome, created_at)
        }
    };

    fill_missing(&mut row, "created_at", created_at);
    fill_missing(&mut row, "updated_at", now);
    fill_missing(&mut row, "version", json!(1));

    write_row(tx, def, &row, "INSERT OR REPLACE")?;
    Ok(outcome)
}

fn delete(tx: &Transaction<'_>, def: &TableDef, change: &ChangeItem) -> CoreResult<ApplyOutcome> {
    let Some(local) = fetch(tx, def, &change.record_id)? else {
        tracing::debug!(target_record = %change.target(), "delete for unknown record ignored");
        return Ok(ApplyOutcome::Unchanged);
    };
    if !is_active(&local) {
        return Ok(ApplyOutcome::Unchanged);
    }

    let deleted_at = change
        .payload
        .get("deleted_at")
        .and_then(Value::as_str)
        .and_then(|text| parse_timestamp(text).ok())
        .unwrap_or_else(|| tx.now());

    tx.execute(
        &format!(
            "UPDATE {} SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
            def.name
        ),
        &[json!(format_timestamp(deleted_at)), json!(change.record_id)],
    )?;
    Ok(ApplyOutcome::Deleted)
}

fn fill_missing(row: &mut Row, column: &str, value: Value) {
    if row.get(column).map_or(true, Value::is_null) {
        row.insert(column.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Duration;
    use fieldlog_sync_protocol::{ConflictResolution, ManualClock};
    use std::sync::Arc;

    fn store() -> (Store, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_rfc3339("2024-05-01T06:00:00.000Z").unwrap());
        let store = Store::new(Config::new().clock(clock.clone())).unwrap();
        (store, clock)
    }

    fn change(action: ChangeAction, table: &str, id: &str, payload: Value) -> ChangeItem {
        ChangeItem::new(action, table, id, payload)
    }

    #[test]
    fn create_inserts_row_without_enqueueing() {
        let (store, _) = store();
        let outcome = store
            .apply_remote(
                &change(ChangeAction::Create, "log_entries", "e1", json!({"id": "e1", "kind": "sighting"})),
                ConflictPolicy::default(),
            )
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Inserted);
        let row = store.records().get("log_entries", "e1").unwrap().unwrap();
        assert_eq!(row["kind"], "sighting");
        assert_eq!(row["created_at"], "2024-05-01T06:00:00.000Z");
        assert_eq!(row["version"], 1);
        assert!(store.queue().is_empty().unwrap());
    }

    #[test]
    fn missing_payload_id_is_taken_from_record_id() {
        let (store, _) = store();
        store
            .apply_remote(
                &change(ChangeAction::Create, "users", "u1", json!({"name": "Ann"})),
                ConflictPolicy::default(),
            )
            .unwrap();
        assert!(store.records().get("users", "u1").unwrap().is_some());
    }

    #[test]
    fn mismatched_payload_id_is_rejected() {
        let (store, _) = store();
        let err = store
            .apply_remote(
                &change(ChangeAction::Create, "users", "u1", json!({"id": "u2"})),
                ConflictPolicy::default(),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidChange { .. }));
    }

    #[test]
    fn unknown_table_and_column_are_rejected() {
        let (store, _) = store();
        let err = store
            .apply_remote(
                &change(ChangeAction::Create, "users; DROP TABLE users", "u1", json!({})),
                ConflictPolicy::default(),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTable { .. }));

        let err = store
            .apply_remote(
                &change(ChangeAction::Create, "users", "u1", json!({"name) VALUES ('x'); --": 1})),
                ConflictPolicy::default(),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidColumn { .. }));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let (store, _) = store();
        let err = store
            .apply_remote(
                &change(ChangeAction::Update, "users", "u1", json!("Ann")),
                ConflictPolicy::default(),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidChange { .. }));
    }

    #[test]
    fn newer_remote_replaces_local_and_keeps_created_at() {
        let (store, clock) = store();
        store.records().insert("users", json!({"id": "u1", "name": "Ann"})).unwrap();
        clock.advance(Duration::hours(1));

        let outcome = store
            .apply_remote(
                &change(
                    ChangeAction::Update,
                    "users",
                    "u1",
                    json!({"id": "u1", "name": "Anna", "updated_at": "2024-05-01T06:30:00.000Z", "version": 2}),
                ),
                ConflictPolicy::LastWriteWins,
            )
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Replaced);
        let row = store.records().get("users", "u1").unwrap().unwrap();
        assert_eq!(row["name"], "Anna");
        assert_eq!(row["created_at"], "2024-05-01T06:00:00.000Z");
        assert_eq!(row["version"], 2);
    }

    #[test]
    fn last_write_wins_keeps_newer_local() {
        let (store, clock) = store();
        clock.advance(Duration::hours(1));
        store.records().insert("users", json!({"id": "u1", "name": "Local"})).unwrap();

        let stale = change(
            ChangeAction::Update,
            "users",
            "u1",
            json!({"name": "Stale", "updated_at": "2024-05-01T06:00:00.000Z", "version": 1}),
        );
        let outcome = store.apply_remote(&stale, ConflictPolicy::LastWriteWins).unwrap();

        let conflict = outcome.conflict().unwrap();
        assert_eq!(conflict.resolution, Some(ConflictResolution::KeepLocal));
        assert!(!outcome.changed_store());
        assert_eq!(store.records().get("users", "u1").unwrap().unwrap()["name"], "Local");
    }

    #[test]
    fn server_wins_overwrites_newer_local() {
        let (store, clock) = store();
        clock.advance(Duration::hours(1));
        store.records().insert("users", json!({"id": "u1", "name": "Local"})).unwrap();

        let stale = change(
            ChangeAction::Update,
            "users",
            "u1",
            json!({"name": "Server", "updated_at": "2024-05-01T06:00:00.000Z"}),
        );
        let outcome = store.apply_remote(&stale, ConflictPolicy::ServerWins).unwrap();

        assert!(matches!(outcome, ApplyOutcome::Overwrote(_)));
        assert_eq!(store.records().get("users", "u1").unwrap().unwrap()["name"], "Server");
    }

    #[test]
    fn delete_sets_deleted_at_once() {
        let (store, _) = store();
        store.records().insert("media", json!({"id": "m1"})).unwrap();
        let delete = change(
            ChangeAction::Delete,
            "media",
            "m1",
            json!({"deleted_at": "2024-05-02T00:00:00Z"}),
        );

        assert_eq!(
            store.apply_remote(&delete, ConflictPolicy::default()).unwrap(),
            ApplyOutcome::Deleted
        );
        let row = store.records().get("media", "m1").unwrap().unwrap();
        assert_eq!(row["deleted_at"], "2024-05-02T00:00:00.000Z");

        assert_eq!(
            store.apply_remote(&delete, ConflictPolicy::default()).unwrap(),
            ApplyOutcome::Unchanged
        );
    }

    #[test]
    fn delete_of_unknown_record_is_a_no_op() {
        let (store, _) = store();
        let generation = store.generation();
        let outcome = store
            .apply_remote(&change(ChangeAction::Delete, "media", "ghost", json!({})), ConflictPolicy::default())
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(store.generation(), generation);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let (store, _) = store();
        let create = change(
            ChangeAction::Create,
            "territories",
            "t1",
            json!({"name": "Ridge", "updated_at": "2024-05-01T05:00:00.000Z", "created_at": "2024-05-01T05:00:00.000Z"}),
        );
        store.apply_remote(&create, ConflictPolicy::default()).unwrap();
        let first = store.records().get("territories", "t1").unwrap();
        store.apply_remote(&create, ConflictPolicy::default()).unwrap();
        assert_eq!(store.records().get("territories", "t1").unwrap(), first);
    }
}
