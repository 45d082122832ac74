//! The unit of replication.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of mutation a change describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// A new record.
    Create,
    /// A modified record.
    Update,
    /// A soft-deleted record.
    Delete,
}

impl ChangeAction {
    /// Returns the wire and storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Returns true for create and update, which carry a full row.
    #[must_use]
    pub const fn is_upsert(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(ProtocolError::InvalidAction(other.to_string())),
        }
    }
}

/// A single replicated mutation.
///
/// The same shape travels in both directions: local queue items are pushed as
/// `ChangeItem`s and the endpoint returns `ChangeItem`s on pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeItem {
    /// Change id. Queue item id on push; the endpoint's id on pull.
    pub id: String,
    /// Kind of mutation.
    pub action: ChangeAction,
    /// Target table.
    pub table_name: String,
    /// Primary key of the affected record.
    pub record_id: String,
    /// Row contents for create/update. May be empty for delete.
    #[serde(default)]
    pub payload: Value,
}

impl ChangeItem {
    /// Creates a change with a fresh random id.
    pub fn new(
        action: ChangeAction,
        table_name: impl Into<String>,
        record_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            table_name: table_name.into(),
            record_id: record_id.into(),
            payload,
        }
    }

    /// Returns the payload as a JSON object, if it is one.
    #[must_use]
    pub fn payload_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.payload.as_object()
    }

    /// Short `table/record` label for logs and error messages.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}/{}", self.table_name, self.record_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_names() {
        for action in [ChangeAction::Create, ChangeAction::Update, ChangeAction::Delete] {
            assert_eq!(action.as_str().parse::<ChangeAction>().unwrap(), action);
        }
        assert!(matches!(
            "upsert".parse::<ChangeAction>(),
            Err(ProtocolError::InvalidAction(_))
        ));
    }

    #[test]
    fn action_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ChangeAction::Delete).unwrap(),
            "\"delete\""
        );
    }

    #[test]
    fn change_wire_shape() {
        let change = ChangeItem {
            id: "c1".into(),
            action: ChangeAction::Create,
            table_name: "log_entries".into(),
            record_id: "r1".into(),
            payload: json!({"id": "r1", "notes": "fox"}),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "c1",
                "action": "create",
                "table_name": "log_entries",
                "record_id": "r1",
                "payload": {"id": "r1", "notes": "fox"}
            })
        );
    }

    #[test]
    fn change_without_payload_decodes() {
        let change: ChangeItem = serde_json::from_value(json!({
            "id": "c2",
            "action": "delete",
            "table_name": "media",
            "record_id": "m1"
        }))
        .unwrap();
        assert_eq!(change.payload, Value::Null);
        assert!(change.payload_object().is_none());
        assert_eq!(change.target(), "media/m1");
    }

    #[test]
    fn new_generates_distinct_ids() {
        let a = ChangeItem::new(ChangeAction::Update, "users", "u1", json!({}));
        let b = ChangeItem::new(ChangeAction::Update, "users", "u1", json!({}));
        assert_ne!(a.id, b.id);
    }
}
