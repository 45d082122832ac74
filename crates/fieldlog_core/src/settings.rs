//! Key/value settings and the sync cursor.

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use chrono::{DateTime, Utc};
use fieldlog_sync_protocol::{format_timestamp, parse_timestamp};
use serde_json::{json, Value};

/// Settings key holding the sync cursor.
pub const LAST_SYNC_TIMESTAMP_KEY: &str = "last_sync_timestamp";

impl Store {
    /// Reads a setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings table cannot be read.
    pub fn get_setting(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self
            .query_one("SELECT value FROM settings WHERE key = ?", &[json!(key)])?
            .and_then(|row| row.get("value").and_then(Value::as_str).map(str::to_string)))
    }

    /// Writes a setting, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_setting(&self, key: &str, value: &str) -> CoreResult<()> {
        let now = format_timestamp(self.now());
        self.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?, ?, ?)",
            &[json!(key), json!(value), json!(now)],
        )?;
        Ok(())
    }

    /// Returns the sync cursor, or `None` before the first successful pull.
    ///
    /// # Errors
    ///
    /// Returns an error if the setting cannot be read or parsed.
    pub fn sync_cursor(&self) -> CoreResult<Option<DateTime<Utc>>> {
        self.get_setting(LAST_SYNC_TIMESTAMP_KEY)?
            .map(|text| parse_timestamp(&text).map_err(CoreError::from))
            .transpose()
    }

    /// Advances the sync cursor to `to`, never moving it backwards.
    ///
    /// Returns the cursor value after the call.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be read or written.
    pub fn advance_sync_cursor(&self, to: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
        self.transaction(|tx| {
            let current = tx
                .query_one(
                    "SELECT value FROM settings WHERE key = ?",
                    &[json!(LAST_SYNC_TIMESTAMP_KEY)],
                )?
                .and_then(|row| row.get("value").and_then(Value::as_str).map(str::to_string))
                .map(|text| parse_timestamp(&text))
                .transpose()?;

            match current {
                Some(current) if current >= to => Ok(current),
                _ => {
                    tx.execute(
                        "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?, ?, ?)",
                        &[
                            json!(LAST_SYNC_TIMESTAMP_KEY),
                            json!(format_timestamp(to)),
                            json!(format_timestamp(tx.now())),
                        ],
                    )?;
                    tracing::debug!(cursor = %format_timestamp(to), "sync cursor advanced");
                    Ok(to)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::store::Store;
    use fieldlog_sync_protocol::parse_timestamp;

    #[test]
    fn settings_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_setting("theme").unwrap().is_none());

        store.set_setting("theme", "dark").unwrap();
        store.set_setting("theme", "light").unwrap();
        assert_eq!(store.get_setting("theme").unwrap().as_deref(), Some("light"));
    }

    #[test]
    fn cursor_starts_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.sync_cursor().unwrap().is_none());
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let store = Store::open_in_memory().unwrap();
        let later = parse_timestamp("2024-05-02T00:00:00Z").unwrap();
        let earlier = parse_timestamp("2024-05-01T00:00:00Z").unwrap();

        assert_eq!(store.advance_sync_cursor(later).unwrap(), later);
        assert_eq!(store.advance_sync_cursor(earlier).unwrap(), later);
        assert_eq!(store.sync_cursor().unwrap(), Some(later));
    }

    #[test]
    fn cursor_is_stored_as_canonical_text() {
        let store = Store::open_in_memory().unwrap();
        let at = parse_timestamp("2024-05-02T08:15:00+02:00").unwrap();
        store.advance_sync_cursor(at).unwrap();
        assert_eq!(
            store.get_setting(super::LAST_SYNC_TIMESTAMP_KEY).unwrap().as_deref(),
            Some("2024-05-02T06:15:00.000Z")
        );
    }

    #[test]
    fn unchanged_cursor_does_not_dirty_store() {
        let store = Store::open_in_memory().unwrap();
        let at = parse_timestamp("2024-05-02T00:00:00Z").unwrap();
        store.advance_sync_cursor(at).unwrap();
        let generation = store.generation();

        store.advance_sync_cursor(at).unwrap();
        assert_eq!(store.generation(), generation);
    }
}
