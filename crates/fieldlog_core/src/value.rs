//! Conversion between JSON values and SQLite values.
//!
//! Statements take their parameters as `serde_json::Value`s and return rows
//! as JSON objects keyed by column name. Nested arrays and objects are stored
//! as JSON text.

use crate::error::CoreResult;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Number, Value};

/// A result row, keyed by column name.
pub type Row = Map<String, Value>;

/// Converts a JSON value into a SQLite value.
#[must_use]
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Converts a SQLite value into JSON.
#[must_use]
pub fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

/// Runs a statement and returns all rows.
pub(crate) fn query_rows(conn: &Connection, sql: &str, params: &[Value]) -> CoreResult<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql)))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = Row::new();
        for (idx, name) in names.iter().enumerate() {
            map.insert(name.clone(), from_sql(row.get_ref(idx)?));
        }
        out.push(map);
    }
    Ok(out)
}

/// Runs a statement, returning `(rows changed, whether it can write)`.
pub(crate) fn execute(conn: &Connection, sql: &str, params: &[Value]) -> CoreResult<(usize, bool)> {
    let mut stmt = conn.prepare(sql)?;
    let writes = !stmt.readonly();
    let changed = stmt.execute(params_from_iter(params.iter().map(to_sql)))?;
    Ok((changed, writes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_conversions() {
        assert_eq!(to_sql(&json!(null)), SqlValue::Null);
        assert_eq!(to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql(&json!(42)), SqlValue::Integer(42));
        assert_eq!(to_sql(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(to_sql(&json!("roe deer")), SqlValue::Text("roe deer".into()));
    }

    #[test]
    fn nested_values_become_json_text() {
        assert_eq!(
            to_sql(&json!({"wind": "NW"})),
            SqlValue::Text(r#"{"wind":"NW"}"#.into())
        );
        assert_eq!(to_sql(&json!([1, 2])), SqlValue::Text("[1,2]".into()));
    }

    #[test]
    fn query_rows_keys_by_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER, b TEXT, c REAL, d BLOB);")
            .unwrap();
        execute(
            &conn,
            "INSERT INTO t VALUES (?, ?, ?, x'0102')",
            &[json!(7), json!("x"), json!(2.5)],
        )
        .unwrap();

        let rows = query_rows(&conn, "SELECT * FROM t WHERE a = ?", &[json!(7)]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({"a": 7, "b": "x", "c": 2.5, "d": [1, 2]})
        );
    }

    #[test]
    fn execute_reports_writes_even_without_changes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER);").unwrap();

        let (changed, writes) = execute(&conn, "INSERT INTO t VALUES (1)", &[]).unwrap();
        assert_eq!((changed, writes), (1, true));

        let (changed, writes) = execute(&conn, "UPDATE t SET a = 2 WHERE 0", &[]).unwrap();
        assert_eq!((changed, writes), (0, true));
    }
}
