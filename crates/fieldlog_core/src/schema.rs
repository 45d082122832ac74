//! Store schema.
//!
//! The synchronized tables are declared once in [`TABLES`]; the DDL, the
//! column allow-list used when applying remote changes, and the migration
//! that adds missing columns to older images are all derived from it.
//!
//! Every synchronized table carries the same audit columns:
//!
//! | Column | Type | Notes |
//! |---|---|---|
//! | `id` | TEXT | primary key, client generated |
//! | `created_at` | TEXT | RFC 3339, set once |
//! | `updated_at` | TEXT | RFC 3339, bumped on every local write |
//! | `deleted_at` | TEXT | soft-delete marker, NULL while active |
//! | `version` | INTEGER | bumped on every local write |
//!
//! Rows in synchronized tables are never physically deleted; a trigger
//! rejects `DELETE` statements against them.

use crate::error::{CoreError, CoreResult};
use rusqlite::Connection;

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Name of the key/value settings table.
pub const SETTINGS_TABLE: &str = "settings";

/// Name of the change queue table.
pub const QUEUE_TABLE: &str = "sync_queue";

/// Audit columns shared by every synchronized table, after `id`.
pub const AUDIT_COLUMNS: &[Column] = &[
    Column::new("created_at", "TEXT NOT NULL"),
    Column::new("updated_at", "TEXT NOT NULL"),
    Column::new("deleted_at", "TEXT"),
    Column::new("version", "INTEGER NOT NULL DEFAULT 1"),
];

/// A column declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: &'static str,
    /// Type and constraints as written in DDL.
    pub decl: &'static str,
}

impl Column {
    /// Creates a column declaration.
    #[must_use]
    pub const fn new(name: &'static str, decl: &'static str) -> Self {
        Self { name, decl }
    }
}

/// A synchronized table.
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    /// Table name.
    pub name: &'static str,
    /// Domain columns (excluding `id` and the audit columns).
    pub columns: &'static [Column],
    /// Columns that get a single-column index.
    pub indexed: &'static [&'static str],
}

impl TableDef {
    /// Returns true if `column` is `id`, an audit column or a domain column.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        column == "id"
            || AUDIT_COLUMNS.iter().any(|c| c.name == column)
            || self.columns.iter().any(|c| c.name == column)
    }

    /// Iterates over every column name in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once("id")
            .chain(self.columns.iter().map(|c| c.name))
            .chain(AUDIT_COLUMNS.iter().map(|c| c.name))
    }

    fn create_sql(&self) -> String {
        let mut cols = vec!["id TEXT PRIMARY KEY".to_string()];
        cols.extend(
            self.columns
                .iter()
                .chain(AUDIT_COLUMNS)
                .map(|c| format!("{} {}", c.name, c.decl)),
        );
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.name,
            cols.join(",\n    ")
        )
    }

    fn index_sql(&self) -> String {
        self.indexed
            .iter()
            .chain(std::iter::once(&"deleted_at"))
            .map(|col| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{col} ON {table}({col});",
                    table = self.name
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn no_delete_trigger_sql(&self) -> String {
        format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_no_delete BEFORE DELETE ON {table}
             BEGIN SELECT RAISE(ABORT, 'rows in {table} are soft-deleted'); END;",
            table = self.name
        )
    }
}

/// The synchronized tables.
pub const TABLES: &[TableDef] = &[
    TableDef {
        name: "users",
        columns: &[
            Column::new("email", "TEXT"),
            Column::new("name", "TEXT"),
            Column::new("last_login", "TEXT"),
        ],
        indexed: &[],
    },
    TableDef {
        name: "territories",
        columns: &[
            Column::new("user_id", "TEXT REFERENCES users(id)"),
            Column::new("name", "TEXT"),
            Column::new("description", "TEXT"),
            Column::new("region", "TEXT"),
            Column::new("area_hectares", "REAL"),
            Column::new("plan", "TEXT DEFAULT 'free'"),
            Column::new("boundary_geojson", "TEXT"),
        ],
        indexed: &["user_id"],
    },
    TableDef {
        name: "log_entries",
        columns: &[
            Column::new("territory_id", "TEXT REFERENCES territories(id)"),
            Column::new("user_id", "TEXT REFERENCES users(id)"),
            Column::new("kind", "TEXT"),
            Column::new("occurred_at", "TEXT"),
            Column::new("gps_lat", "REAL"),
            Column::new("gps_lon", "REAL"),
            Column::new("gps_accuracy", "REAL"),
            Column::new("location_note", "TEXT"),
            Column::new("species_id", "TEXT"),
            Column::new("species_name", "TEXT"),
            Column::new("count", "INTEGER DEFAULT 1"),
            Column::new("hunt_method", "TEXT"),
            Column::new("weather_json", "TEXT"),
            Column::new("notes", "TEXT"),
            Column::new("photo_ids", "TEXT"),
            Column::new("visibility", "TEXT DEFAULT 'territory'"),
            Column::new("details_json", "TEXT"),
            Column::new("created_by", "TEXT"),
        ],
        indexed: &["territory_id", "user_id", "kind", "occurred_at"],
    },
    TableDef {
        name: "shot_analyses",
        columns: &[
            Column::new("entry_id", "TEXT REFERENCES log_entries(id)"),
            Column::new("hit_zone", "TEXT"),
            Column::new("confidence", "REAL"),
            Column::new("wait_time_min", "INTEGER"),
            Column::new("wait_time_optimal", "INTEGER"),
            Column::new("wait_time_max", "INTEGER"),
            Column::new("dog_required", "INTEGER"),
            Column::new("dog_type", "TEXT"),
            Column::new("blood_color", "TEXT"),
            Column::new("blood_amount", "TEXT"),
            Column::new("blood_distribution", "TEXT"),
            Column::new("animal_reaction", "TEXT"),
            Column::new("prediction_zones", "TEXT"),
        ],
        indexed: &["entry_id"],
    },
    TableDef {
        name: "tracking_points",
        columns: &[
            Column::new("entry_id", "TEXT REFERENCES log_entries(id)"),
            Column::new("recorded_at", "TEXT"),
            Column::new("gps_lat", "REAL"),
            Column::new("gps_lon", "REAL"),
            Column::new("accuracy", "REAL"),
            Column::new("altitude", "REAL"),
            Column::new("speed", "REAL"),
            Column::new("heading", "REAL"),
        ],
        indexed: &["entry_id", "recorded_at"],
    },
    TableDef {
        name: "media",
        columns: &[
            Column::new("entry_id", "TEXT REFERENCES log_entries(id)"),
            Column::new("map_feature_id", "TEXT REFERENCES map_features(id)"),
            Column::new("local_uri", "TEXT"),
            Column::new("remote_uri", "TEXT"),
            Column::new("thumbnail_uri", "TEXT"),
            Column::new("file_name", "TEXT"),
            Column::new("mime_type", "TEXT"),
            Column::new("size_bytes", "INTEGER"),
            Column::new("width", "INTEGER"),
            Column::new("height", "INTEGER"),
            Column::new("captured_at", "TEXT"),
            Column::new("captured_lat", "REAL"),
            Column::new("captured_lon", "REAL"),
        ],
        indexed: &["entry_id", "map_feature_id"],
    },
    TableDef {
        name: "map_features",
        columns: &[
            Column::new("territory_id", "TEXT REFERENCES territories(id)"),
            Column::new("user_id", "TEXT REFERENCES users(id)"),
            Column::new("kind", "TEXT"),
            Column::new("name", "TEXT"),
            Column::new("description", "TEXT"),
            Column::new("geometry_type", "TEXT"),
            Column::new("coordinates", "TEXT"),
            Column::new("category", "TEXT"),
            Column::new("status", "TEXT"),
            Column::new("last_inspection", "TEXT"),
            Column::new("next_inspection", "TEXT"),
            Column::new("photo_ids", "TEXT"),
            Column::new("icon", "TEXT"),
            Column::new("color", "TEXT"),
        ],
        indexed: &["territory_id", "user_id", "kind", "category"],
    },
    TableDef {
        name: "training_uploads",
        columns: &[
            Column::new("user_id", "TEXT REFERENCES users(id)"),
            Column::new("data_type", "TEXT"),
            Column::new("file_path", "TEXT"),
            Column::new("species", "TEXT"),
            Column::new("quality_score", "REAL"),
            Column::new("metadata_json", "TEXT"),
            Column::new("upload_status", "TEXT DEFAULT 'pending'"),
            Column::new("uploaded_at", "TEXT"),
            Column::new("points", "INTEGER DEFAULT 0"),
        ],
        indexed: &["user_id", "data_type"],
    },
];

const SUPPORT_SQL: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_queue (
    id TEXT PRIMARY KEY,
    action TEXT NOT NULL CHECK (action IN ('create', 'update', 'delete')),
    table_name TEXT NOT NULL,
    record_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'syncing', 'completed', 'failed')),
    attempts INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    last_attempt TEXT,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue(status);
CREATE INDEX IF NOT EXISTS idx_sync_queue_created_at ON sync_queue(created_at);

CREATE TRIGGER IF NOT EXISTS sync_queue_immutable
BEFORE UPDATE OF action, table_name, record_id, payload, created_at ON sync_queue
BEGIN SELECT RAISE(ABORT, 'queue item contents are immutable'); END;
";

/// Looks up a synchronized table by name.
#[must_use]
pub fn table(name: &str) -> Option<&'static TableDef> {
    TABLES.iter().find(|t| t.name == name)
}

/// Looks up a synchronized table, failing with [`CoreError::InvalidTable`].
pub fn require_table(name: &str) -> CoreResult<&'static TableDef> {
    table(name).ok_or_else(|| CoreError::invalid_table(name))
}

/// Reads `PRAGMA user_version`.
pub fn schema_version(conn: &Connection) -> CoreResult<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Creates or upgrades the schema. Safe to run against any existing image.
///
/// # Errors
///
/// - [`CoreError::SchemaTooNew`] if the image comes from a newer build
/// - [`CoreError::Sqlite`] if the image is not a database or DDL fails
pub fn apply(conn: &Connection) -> CoreResult<()> {
    let found = schema_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(CoreError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    let mut ddl = String::from(SUPPORT_SQL);
    for table in TABLES {
        ddl.push_str(&table.create_sql());
        ddl.push('\n');
    }
    conn.execute_batch(&format!("BEGIN;\n{ddl}\nCOMMIT;"))?;

    for table in TABLES {
        add_missing_columns(conn, table)?;
        conn.execute_batch(&table.index_sql())?;
        conn.execute_batch(&table.no_delete_trigger_sql())?;
    }

    if found < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tracing::debug!(from = found, to = SCHEMA_VERSION, "schema version updated");
    }
    Ok(())
}

// Images written before a column existed get it appended; SQLite fills NULL
// or the declared default for existing rows.
fn add_missing_columns(conn: &Connection, table: &TableDef) -> CoreResult<()> {
    let existing = existing_columns(conn, table.name)?;
    for column in table.columns.iter().chain(AUDIT_COLUMNS) {
        if existing.iter().any(|c| c == column.name) {
            continue;
        }
        // ALTER TABLE cannot add a NOT NULL column without a default.
        let decl = column.decl.replace("NOT NULL", "");
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} {};",
            table.name, column.name, decl
        ))?;
        tracing::info!(table = table.name, column = column.name, "added missing column");
    }
    Ok(())
}

/// Returns the column names of a table as stored in the image.
pub fn existing_columns(conn: &Connection, table: &str) -> CoreResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
