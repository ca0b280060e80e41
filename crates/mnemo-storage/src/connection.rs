//! Single write connection behind a mutex.
//! One handle per process; serialized writes, no contention.
//!
//! The guard is never held across an await point (closures passed in
//! are synchronous), so a std mutex serves both sync and async callers.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use mnemo_core::errors::MnemoResult;

use crate::pragmas::apply_pragmas;
use crate::to_storage_err;

/// Prepared statements memoized on the connection survive until the
/// handle itself is dropped, so a replaced handle can never serve a
/// statement compiled against the old one.
const STATEMENT_CACHE_CAPACITY: usize = 64;

/// The process-wide database handle.
pub struct DbHandle {
    conn: Mutex<Connection>,
}

impl DbHandle {
    /// Open a handle to the given database file.
    pub fn open(path: &Path) -> MnemoResult<Self> {
        let conn = Connection::open(path).map_err(|e| to_storage_err(e.to_string()))?;
        Self::configure(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> MnemoResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| to_storage_err(e.to_string()))?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> MnemoResult<Self> {
        apply_pragmas(&conn)?;
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the lock and execute a closure with the connection
    /// (async callers).
    pub async fn with_conn<F, T>(&self, f: F) -> MnemoResult<T>
    where
        F: FnOnce(&Connection) -> MnemoResult<T>,
    {
        self.with_conn_sync(f)
    }

    /// Acquire the lock and execute a closure with the connection.
    pub fn with_conn_sync<F, T>(&self, f: F) -> MnemoResult<T>
    where
        F: FnOnce(&Connection) -> MnemoResult<T>,
    {
        let guard = self.conn.lock().expect("database mutex poisoned");
        f(&guard)
    }
}
