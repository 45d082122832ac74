//! The embedded store.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::queue::ChangeQueue;
use crate::records::Records;
use crate::schema;
use crate::value::{self, Row};
use chrono::{DateTime, Utc};
use fieldlog_storage::ImageStore;
use fieldlog_sync_protocol::Clock;
use parking_lot::Mutex;
use rusqlite::{Connection, DatabaseName};
use serde_json::Value;
use std::cell::Cell;
use tokio::sync::watch;

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

/// The embedded store.
///
/// `Store` holds the whole dataset in an in-memory SQLite database. Durable
/// bytes only exist as the *image* produced by [`export`](Self::export) and
/// handed to an [`ImageStore`] by the [`Persister`](crate::Persister).
///
/// # Mutations
///
/// Every write goes through [`transaction`](Self::transaction) (or
/// [`execute`](Self::execute), which wraps it). A committed transaction that
/// wrote anything bumps the store's *generation* and wakes subscribers of
/// [`subscribe_changes`](Self::subscribe_changes), which is how the autosave
/// task learns that a flush is due.
///
/// # Example
///
/// ```rust
/// use fieldlog_core::Store;
/// use serde_json::json;
///
/// let store = Store::open_in_memory().unwrap();
/// store.execute(
///     "INSERT INTO users (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
///     &[json!("u1"), json!("Ann"), json!("2024-01-01T00:00:00.000Z"), json!("2024-01-01T00:00:00.000Z")],
/// ).unwrap();
///
/// let rows = store.query("SELECT name FROM users WHERE id = ?", &[json!("u1")]).unwrap();
/// assert_eq!(rows[0]["name"], "Ann");
/// ```
pub struct Store {
    conn: Mutex<Connection>,
    config: Config,
    generation: watch::Sender<u64>,
}

impl Store {
    /// Opens a store from the image held by `image_store`.
    ///
    /// A missing image creates a fresh store. The schema is applied in both
    /// cases.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageInit`] if the image cannot be loaded, is not
    /// a store image, or the schema cannot be applied. No partial store is
    /// returned.
    pub fn open(image_store: &dyn ImageStore, config: Config) -> CoreResult<Self> {
        let image = image_store.load().map_err(|e| {
            tracing::error!(adapter = %image_store.describe(), error = %e, "failed to load store image");
            CoreError::storage_init(format!("loading image from {}: {e}", image_store.describe()))
        })?;

        match image {
            Some(bytes) => {
                tracing::debug!(adapter = %image_store.describe(), bytes = bytes.len(), "loading existing image");
                Self::from_image(&bytes, config)
            }
            None => {
                tracing::debug!(adapter = %image_store.describe(), "no image found, creating fresh store");
                Self::new(config)
            }
        }
    }

    /// Creates a fresh, empty store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageInit`] if the schema cannot be created.
    pub fn new(config: Config) -> CoreResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CoreError::storage_init(format!("creating database: {e}")))?;
        Self::init(conn, config)
    }

    /// Creates a fresh store with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageInit`] if the schema cannot be created.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::new(Config::default())
    }

    /// Opens a store from an exported image.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageInit`] if the bytes are not a store image.
    pub fn from_image(bytes: &[u8], config: Config) -> CoreResult<Self> {
        let conn = load_image(bytes)
            .and_then(|conn| {
                let problems = quick_check(&conn)?;
                if problems.is_empty() {
                    Ok(conn)
                } else {
                    Err(CoreError::invalid_image(problems.join("; ")))
                }
            })
            .map_err(|e| {
                tracing::error!(error = %e, "store image is unreadable");
                CoreError::storage_init(e.to_string())
            })?;
        Self::init(conn, config)
    }

    fn init(conn: Connection, config: Config) -> CoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)
            .map_err(|e| CoreError::storage_init(e.to_string()))?;
        schema::apply(&conn).map_err(|e| {
            tracing::error!(error = %e, "failed to apply schema");
            CoreError::storage_init(format!("applying schema: {e}"))
        })?;

        let (generation, _) = watch::channel(0);
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            generation,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the store's time source.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.config.clock.as_ref()
    }

    /// Returns the current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.config.clock.now()
    }

    /// Runs `f` inside a transaction.
    ///
    /// The transaction commits if `f` returns `Ok` and rolls back otherwise.
    /// `f` must not call back into this `Store`; use the [`Transaction`]
    /// handle instead.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a SQLite error from begin/commit.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> CoreResult<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let (result, wrote) = {
            let handle = Transaction {
                conn: &*tx,
                clock: self.config.clock.as_ref(),
                wrote: Cell::new(false),
            };
            let result = f(&handle);
            (result, handle.wrote.get())
        };

        match result {
            Ok(value) => {
                tx.commit()?;
                if wrote {
                    self.bump_generation();
                }
                Ok(value)
            }
            Err(e) => {
                drop(tx);
                Err(e)
            }
        }
    }

    /// Runs a single mutating statement in its own transaction.
    ///
    /// Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if the statement fails.
    pub fn execute(&self, sql: &str, params: &[Value]) -> CoreResult<usize> {
        self.transaction(|tx| tx.execute(sql, params))
    }

    /// Runs a query and returns every row.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if the statement fails.
    pub fn query(&self, sql: &str, params: &[Value]) -> CoreResult<Vec<Row>> {
        let conn = self.conn.lock();
        value::query_rows(&conn, sql, params)
    }

    /// Runs a query and returns the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if the statement fails.
    pub fn query_one(&self, sql: &str, params: &[Value]) -> CoreResult<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Serializes the whole store into an image.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if serialization fails.
    pub fn export(&self) -> CoreResult<Vec<u8>> {
        Ok(self.export_with_generation()?.1)
    }

    /// Serializes the store together with the generation the image reflects.
    pub(crate) fn export_with_generation(&self) -> CoreResult<(u64, Vec<u8>)> {
        let conn = self.conn.lock();
        let data = conn.serialize(DatabaseName::Main)?;
        Ok((self.generation(), data.to_vec()))
    }

    /// Replaces the live database with an image, e.g. restoring a backup.
    ///
    /// The image is validated (header, schema, integrity) in a scratch
    /// database first; the live store is untouched if validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidImage`] if the image is rejected.
    pub fn import_image(&self, bytes: &[u8]) -> CoreResult<()> {
        let scratch = load_image(bytes)?;
        schema::apply(&scratch).map_err(|e| CoreError::invalid_image(e.to_string()))?;
        let problems = integrity_problems(&scratch)?;
        if !problems.is_empty() {
            return Err(CoreError::invalid_image(problems.join("; ")));
        }
        let image = scratch.serialize(DatabaseName::Main)?.to_vec();
        drop(scratch);

        let mut conn = self.conn.lock();
        conn.deserialize_read_exact(DatabaseName::Main, &image[..], image.len(), false)?;
        conn.pragma_update(None, "foreign_keys", self.config.foreign_keys)?;
        self.bump_generation();
        drop(conn);

        tracing::info!(bytes = image.len(), "imported store image");
        Ok(())
    }

    /// Runs SQLite's integrity check.
    ///
    /// Returns an empty list when the database is healthy.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if the check cannot run.
    pub fn integrity_check(&self) -> CoreResult<Vec<String>> {
        let conn = self.conn.lock();
        integrity_problems(&conn)
    }

    /// Returns the schema version stored in the image.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if the pragma cannot be read.
    pub fn schema_version(&self) -> CoreResult<i64> {
        let conn = self.conn.lock();
        schema::schema_version(&conn)
    }

    /// Returns the change queue.
    #[must_use]
    pub fn queue(&self) -> ChangeQueue<'_> {
        ChangeQueue::new(self)
    }

    /// Returns the local write API for synchronized tables.
    #[must_use]
    pub fn records(&self) -> Records<'_> {
        Records::new(self)
    }

    /// Returns the current change generation.
    ///
    /// Starts at zero when the store is opened and increases with every
    /// committed write.
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Subscribes to generation changes.
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    fn bump_generation(&self) {
        self.generation.send_modify(|g| *g += 1);
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("generation", &self.generation())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle passed to [`Store::transaction`] closures.
pub struct Transaction<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
    wrote: Cell<bool>,
}

impl Transaction<'_> {
    /// Runs a statement; returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if the statement fails.
    pub fn execute(&self, sql: &str, params: &[Value]) -> CoreResult<usize> {
        let (changed, writes) = value::execute(self.conn, sql, params)?;
        if writes {
            self.wrote.set(true);
        }
        Ok(changed)
    }

    /// Runs a query and returns every row.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if the statement fails.
    pub fn query(&self, sql: &str, params: &[Value]) -> CoreResult<Vec<Row>> {
        value::query_rows(self.conn, sql, params)
    }

    /// Runs a query and returns the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if the statement fails.
    pub fn query_one(&self, sql: &str, params: &[Value]) -> CoreResult<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Returns the current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

fn load_image(bytes: &[u8]) -> CoreResult<Connection> {
    if !bytes.starts_with(SQLITE_HEADER) {
        return Err(CoreError::invalid_image("not a SQLite database image"));
    }
    let mut conn = Connection::open_in_memory()?;
    conn.deserialize_read_exact(DatabaseName::Main, bytes, bytes.len(), false)?;
    Ok(conn)
}

fn integrity_problems(conn: &Connection) -> CoreResult<Vec<String>> {
    pragma_problems(conn, "PRAGMA integrity_check")
}

fn quick_check(conn: &Connection) -> CoreResult<Vec<String>> {
    pragma_problems(conn, "PRAGMA quick_check")
}

fn pragma_problems(conn: &Connection, pragma: &str) -> CoreResult<Vec<String>> {
    let mut stmt = conn.prepare(pragma)?;
    let lines = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.into_iter().filter(|line| line != "ok").collect())
}
