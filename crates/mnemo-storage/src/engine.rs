//! MemoryStore — owns the database handle, runs migrations at startup,
//! probes the sqlite-vec extension, and detects embedding-model drift.

use std::path::{Path, PathBuf};
use std::sync::Once;

use rusqlite::Connection;
use tracing::{info, warn};

use mnemo_core::errors::MnemoResult;
use mnemo_core::traits::EmbeddingInfo;

use crate::connection::DbHandle;
use crate::migrations;
use crate::model_change;

/// Register sqlite-vec as an auto extension, once per process, before
/// the first connection opens.
fn register_vec_extension() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| unsafe {
        type InitFn = unsafe extern "C" fn(
            *mut rusqlite::ffi::sqlite3,
            *mut *mut std::os::raw::c_char,
            *const rusqlite::ffi::sqlite3_api_routines,
        ) -> i32;
        let entry: InitFn = std::mem::transmute(sqlite_vec::sqlite3_vec_init as *const ());
        rusqlite::ffi::sqlite3_auto_extension(Some(entry));
    });
}

/// The main store. Owns the single database handle; every component
/// borrows it for the duration of a call.
pub struct MemoryStore {
    handle: DbHandle,
    db_path: Option<PathBuf>,
    vec_available: bool,
    dimension: usize,
    model_name: String,
}

impl MemoryStore {
    /// Open a store backed by a file on disk.
    pub fn open(path: &Path, embedding: &EmbeddingInfo) -> MnemoResult<Self> {
        register_vec_extension();
        let handle = DbHandle::open(path)?;
        let mut store = Self {
            handle,
            db_path: Some(path.to_path_buf()),
            vec_available: false,
            dimension: embedding.dimension,
            model_name: embedding.model_name.clone(),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory(embedding: &EmbeddingInfo) -> MnemoResult<Self> {
        register_vec_extension();
        let handle = DbHandle::open_in_memory()?;
        let mut store = Self {
            handle,
            db_path: None,
            vec_available: false,
            dimension: embedding.dimension,
            model_name: embedding.model_name.clone(),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Run migrations, probe sqlite-vec, create the vector table, and
    /// requeue rows whose embeddings no longer match the provider.
    fn initialize(&mut self) -> MnemoResult<()> {
        let dimension = self.dimension;
        let model_name = self.model_name.clone();
        let vec_available = self.handle.with_conn_sync(|conn| {
            migrations::run_migrations(conn)?;

            let available = probe_vec(conn);
            if available {
                create_vec_table(conn, dimension)?;
            } else {
                warn!("sqlite-vec extension unavailable; vector search disabled");
            }

            model_change::reconcile(conn, &model_name, dimension, available)?;
            Ok(available)
        })?;
        self.vec_available = vec_available;
        info!(
            vec_available,
            dimension,
            model = %self.model_name,
            "memory store initialized"
        );
        Ok(())
    }

    /// Whether the vec_memories virtual table can be used.
    pub fn vec_available(&self) -> bool {
        self.vec_available
    }

    /// The process-wide embedding dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The configured embedding model name.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Path of the backing database file, if file-backed.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Nearest-neighbour search over stored vectors. Disabled (empty
    /// results, never an error) when the vector extension is missing.
    pub async fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
    ) -> MnemoResult<Vec<(i64, f64)>> {
        if !self.vec_available {
            warn!("vector search requested but sqlite-vec is unavailable");
            return Ok(Vec::new());
        }
        self.with_conn(|conn| crate::queries::vector_ops::search_similar(conn, query, limit))
            .await
    }

    /// Execute a closure against the connection (async callers).
    pub async fn with_conn<F, T>(&self, f: F) -> MnemoResult<T>
    where
        F: FnOnce(&Connection) -> MnemoResult<T>,
    {
        self.handle.with_conn(f).await
    }

    /// Execute a closure against the connection (sync callers).
    pub fn with_conn_sync<F, T>(&self, f: F) -> MnemoResult<T>
    where
        F: FnOnce(&Connection) -> MnemoResult<T>,
    {
        self.handle.with_conn_sync(f)
    }
}

/// Harmless probe: `vec_version()` only resolves when the extension
/// loaded. Failure degrades vector paths and nothing else.
fn probe_vec(conn: &Connection) -> bool {
    conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
        .is_ok()
}

fn create_vec_table(conn: &Connection, dimension: usize) -> MnemoResult<()> {
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_memories USING vec0(embedding float[{dimension}])"
    ))
    .map_err(|e| crate::to_storage_err(e.to_string()))?;
    Ok(())
}
