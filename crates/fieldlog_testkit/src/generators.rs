//! Property-based test generators using proptest.
//!
//! Provides strategies for generating local writes, queue entries and
//! remote changes that respect the store schema.

use fieldlog_core::{schema, CoreResult, Store};
use fieldlog_sync_protocol::{format_timestamp, parse_timestamp, ChangeAction, ChangeItem};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for picking a synchronized table name.
pub fn table_name_strategy() -> impl Strategy<Value = &'static str> {
    let names: Vec<&'static str> = schema::TABLES.iter().map(|t| t.name).collect();
    prop::sample::select(names)
}

/// Strategy for generating record ids.
///
/// Ids are drawn from a small alphabet so sequences revisit records.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f][0-9]?").expect("Invalid regex")
}

/// Strategy for generating change actions.
pub fn action_strategy() -> impl Strategy<Value = ChangeAction> {
    prop_oneof![
        Just(ChangeAction::Create),
        Just(ChangeAction::Update),
        Just(ChangeAction::Delete),
    ]
}

/// Strategy for generating user names, sometimes absent.
pub fn name_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::string::string_regex("[A-Z][a-z]{0,8}").expect("Invalid regex"))
}

/// Strategy for generating an offset in seconds from the fixture epoch.
pub fn offset_strategy() -> impl Strategy<Value = i64> {
    -3600i64..3600
}

/// A local operation against the `users` table.
#[derive(Debug, Clone)]
pub enum LocalOp {
    /// Insert a user.
    Insert {
        /// Record id.
        id: String,
        /// Display name.
        name: Option<String>,
    },
    /// Update a user's name.
    Update {
        /// Record id.
        id: String,
        /// New display name.
        name: Option<String>,
    },
    /// Soft-delete a user.
    Delete {
        /// Record id.
        id: String,
    },
}

impl LocalOp {
    /// Applies the operation through the record API.
    ///
    /// Returns false if the store refused it (duplicate insert, missing or
    /// deleted record); a refused operation queues nothing.
    pub fn apply(&self, store: &Store) -> bool {
        let records = store.records();
        let result: CoreResult<()> = match self {
            LocalOp::Insert { id, name } => records
                .insert("users", json!({"id": id, "name": name}))
                .map(drop),
            LocalOp::Update { id, name } => records
                .update("users", id, json!({"name": name}))
                .map(drop),
            LocalOp::Delete { id } => records.soft_delete("users", id).map(drop),
        };
        result.is_ok()
    }
}

/// Strategy for generating local operations.
pub fn local_op_strategy() -> impl Strategy<Value = LocalOp> {
    prop_oneof![
        3 => (record_id_strategy(), name_strategy())
            .prop_map(|(id, name)| LocalOp::Insert { id, name }),
        2 => (record_id_strategy(), name_strategy())
            .prop_map(|(id, name)| LocalOp::Update { id, name }),
        1 => record_id_strategy().prop_map(|id| LocalOp::Delete { id }),
    ]
}

/// Strategy for generating a sequence of local operations.
pub fn local_op_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<LocalOp>> {
    prop::collection::vec(local_op_strategy(), min_ops..max_ops)
}

/// Arguments of one direct queue append.
#[derive(Debug, Clone)]
pub struct EnqueueArgs {
    /// Action.
    pub action: ChangeAction,
    /// Table.
    pub table_name: &'static str,
    /// Record id.
    pub record_id: String,
    /// Payload.
    pub payload: Value,
}

/// Strategy for generating direct queue appends.
pub fn enqueue_args_strategy() -> impl Strategy<Value = EnqueueArgs> {
    (action_strategy(), table_name_strategy(), record_id_strategy()).prop_map(
        |(action, table_name, record_id)| EnqueueArgs {
            action,
            table_name,
            payload: json!({"id": record_id}),
            record_id,
        },
    )
}

/// Strategy for generating remote changes to the `users` table.
///
/// `create` and `update` carry a full row stamped relative to `epoch`;
/// `delete` carries only the record id.
pub fn remote_user_change_strategy(epoch: &str) -> impl Strategy<Value = ChangeItem> {
    let epoch = parse_timestamp(epoch).expect("Invalid epoch");
    (
        action_strategy(),
        record_id_strategy(),
        name_strategy(),
        offset_strategy(),
        1i64..5,
    )
        .prop_map(move |(action, id, name, offset, version)| {
            let payload = match action {
                ChangeAction::Delete => json!({"id": id}),
                _ => {
                    let updated_at = epoch + chrono::Duration::seconds(offset);
                    json!({
                        "id": id,
                        "name": name,
                        "updated_at": format_timestamp(updated_at),
                        "version": version,
                    })
                }
            };
            ChangeItem::new(action, "users", id, payload)
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn table_names_are_synchronized(table in table_name_strategy()) {
            prop_assert!(schema::table(table).is_some());
        }

        #[test]
        fn record_ids_are_not_empty(id in record_id_strategy()) {
            prop_assert!(!id.is_empty());
        }

        #[test]
        fn remote_changes_target_their_payload(
            change in remote_user_change_strategy("2024-05-01T06:00:00Z")
        ) {
            prop_assert_eq!(change.payload["id"].as_str(), Some(change.record_id.as_str()));
            if change.action != ChangeAction::Delete {
                prop_assert!(change.payload["updated_at"].is_string());
            }
        }
    }
}
