//! CheckpointEngine — create, list, get, restore, delete.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use chrono::{Duration, Utc};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use mnemo_core::config::EngineConfig;
use mnemo_core::errors::{CheckpointError, MnemoResult};
use mnemo_core::memory::EmbeddingStatus;
use mnemo_core::models::{CheckpointDescriptor, RestoreReport};
use mnemo_storage::queries::{memory_crud, vector_ops, working_memory_ops};
use mnemo_storage::MemoryStore;

use crate::blob::{self, EmbeddingEntry, Snapshot, SnapshotMetadata};
use crate::git;
use crate::restore::{restore_on_conn, RestoreOptions};

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-Za-z0-9_-]{1,100}$").expect("valid checkpoint regex"))
}

/// Options for `create`.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Scope the snapshot to one spec folder; absent snapshots the
    /// whole store.
    pub spec_folder: Option<String>,
    /// Caller-provided metadata stored alongside the blob.
    pub metadata: Option<serde_json::Value>,
    pub include_working_memory: bool,
    /// Restrict captured working memory to one session.
    pub session_id: Option<String>,
}

/// A decoded checkpoint: descriptor plus the snapshot payload.
#[derive(Debug)]
pub struct CheckpointData {
    pub descriptor: CheckpointDescriptor,
    pub snapshot: Snapshot,
    /// The stored blob used the legacy bare-array shape.
    pub legacy: bool,
}

/// Compressed snapshot engine bound to one store.
pub struct CheckpointEngine {
    store: Arc<MemoryStore>,
    config: EngineConfig,
}

impl CheckpointEngine {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<MemoryStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Snapshot the scope into a named checkpoint. Returns the row id.
    pub async fn create(&self, name: &str, options: CreateOptions) -> MnemoResult<i64> {
        if !name_pattern().is_match(name) {
            return Err(CheckpointError::InvalidName {
                name: name.to_string(),
            }
            .into());
        }

        let dimension = self.store.dimension();
        let vec_available = self.store.vec_available();
        let model_name = self.store.model_name().to_string();
        let scope = options.spec_folder.clone();
        let include_wm = options.include_working_memory;
        let session_id = options.session_id.clone();

        // Collect everything under one borrow of the connection.
        let snapshot = self
            .store
            .with_conn(move |conn| {
                collect_snapshot(
                    conn,
                    scope.as_deref(),
                    include_wm,
                    session_id.as_deref(),
                    dimension,
                    vec_available,
                )
            })
            .await?;

        let uncompressed_len = blob::encoded_json_len(&snapshot)?;
        if uncompressed_len > self.config.max_snapshot_bytes {
            return Err(CheckpointError::SizeLimitExceeded {
                bytes: uncompressed_len,
                max: self.config.max_snapshot_bytes,
            }
            .into());
        }
        let (compressed, _) = blob::encode(&snapshot)?;

        let branch_dir = options
            .spec_folder
            .clone()
            .unwrap_or_else(|| ".".to_string());
        let git_branch = git::detect_branch(Path::new(&branch_dir)).await;

        let name = name.to_string();
        let metadata_json = options
            .metadata
            .as_ref()
            .map(|v| v.to_string());
        let spec_folder = options.spec_folder.clone();
        let max_checkpoints = self.config.max_checkpoints;
        let ttl_days = self.config.checkpoint_ttl_days;

        let checkpoint_id = self
            .store
            .with_conn(move |conn| {
                let tx = conn
                    .unchecked_transaction()
                    .map_err(|e| crate::storage_err(format!("checkpoint begin: {e}")))?;

                let changed = tx
                    .execute(
                        "INSERT OR IGNORE INTO checkpoints
                            (name, spec_folder, git_branch, snapshot, metadata)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![name, spec_folder, git_branch, compressed, metadata_json],
                    )
                    .map_err(|e| crate::storage_err(e.to_string()))?;
                if changed == 0 {
                    let _ = tx.rollback();
                    return Err(CheckpointError::NameCollision { name }.into());
                }
                let id = tx.last_insert_rowid();

                // Cap and TTL pruning share the insert's transaction so
                // concurrent creation cannot over-prune.
                prune_scope(&tx, spec_folder.as_deref(), max_checkpoints, ttl_days)?;

                tx.commit()
                    .map_err(|e| crate::storage_err(format!("checkpoint commit: {e}")))?;
                Ok(id)
            })
            .await?;

        info!(
            checkpoint_id,
            model = %model_name,
            memories = snapshot.memories.len(),
            embeddings = snapshot.embeddings.len(),
            "checkpoint created"
        );
        Ok(checkpoint_id)
    }

    /// Descriptor rows only; no blob is read.
    pub async fn list(
        &self,
        spec_folder: Option<&str>,
        limit: Option<usize>,
    ) -> MnemoResult<Vec<CheckpointDescriptor>> {
        let spec_folder = spec_folder.map(str::to_string);
        let limit = limit.unwrap_or(mnemo_core::constants::DEFAULT_LIST_LIMIT) as i64;
        self.store
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare_cached(
                        "SELECT id, name, created_at, last_used_at, spec_folder, git_branch, metadata
                         FROM checkpoints
                         WHERE (?1 IS NULL OR spec_folder = ?1)
                         ORDER BY created_at DESC
                         LIMIT ?2",
                    )
                    .map_err(|e| crate::storage_err(e.to_string()))?;
                let rows = stmt
                    .query_map(params![spec_folder, limit], row_to_descriptor)
                    .map_err(|e| crate::storage_err(e.to_string()))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(|e| crate::storage_err(e.to_string()))
            })
            .await
    }

    /// Decompress and parse one checkpoint, touching `last_used_at`.
    pub async fn get(&self, name: &str) -> MnemoResult<CheckpointData> {
        let name = name.to_string();
        self.store
            .with_conn(move |conn| {
                let (descriptor, blob_bytes) = fetch_checkpoint(conn, &name)?;
                let (snapshot, legacy) = blob::decode(&name, &blob_bytes)?;
                touch_last_used(conn, &name)?;
                Ok(CheckpointData {
                    descriptor,
                    snapshot,
                    legacy,
                })
            })
            .await
    }

    /// Restore a checkpoint inside one transaction. No reader observes
    /// a partially restored state.
    pub async fn restore(
        &self,
        name: &str,
        options: RestoreOptions,
    ) -> MnemoResult<RestoreReport> {
        let name = name.to_string();
        let dimension = self.store.dimension();
        let vec_available = self.store.vec_available();

        self.store
            .with_conn(move |conn| {
                let (descriptor, blob_bytes) = fetch_checkpoint(conn, &name)?;
                let (snapshot, legacy) = blob::decode(&name, &blob_bytes)?;
                if legacy {
                    warn!(name = %name, "restoring legacy bare-array snapshot");
                }

                let tx = conn
                    .unchecked_transaction()
                    .map_err(|e| crate::storage_err(format!("restore begin: {e}")))?;
                let result = restore_on_conn(
                    &tx,
                    &snapshot,
                    descriptor.spec_folder.as_deref(),
                    &options,
                    dimension,
                    vec_available,
                );
                match result {
                    Ok(report) => {
                        tx.commit()
                            .map_err(|e| crate::storage_err(format!("restore commit: {e}")))?;
                        touch_last_used(conn, &name)?;
                        Ok(report)
                    }
                    Err(e) => {
                        let _ = tx.rollback();
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Idempotent removal. Returns whether a row existed.
    pub async fn delete(&self, name: &str) -> MnemoResult<bool> {
        let name = name.to_string();
        self.store
            .with_conn(move |conn| {
                let rows = conn
                    .execute("DELETE FROM checkpoints WHERE name = ?1", params![name])
                    .map_err(|e| crate::storage_err(e.to_string()))?;
                Ok(rows > 0)
            })
            .await
    }
}

fn collect_snapshot(
    conn: &Connection,
    scope: Option<&str>,
    include_working_memory: bool,
    session_id: Option<&str>,
    dimension: usize,
    vec_available: bool,
) -> MnemoResult<Snapshot> {
    let memories = memory_crud::list_memories(conn, scope)?;

    let mut embeddings = Vec::new();
    if vec_available {
        for memory in &memories {
            if memory.embedding_status != EmbeddingStatus::Success {
                continue;
            }
            match vector_ops::get_embedding(conn, memory.id, dimension) {
                Ok(Some(embedding)) => embeddings.push(EmbeddingEntry {
                    memory_id: memory.id,
                    embedding,
                }),
                Ok(None) => {}
                Err(e) => {
                    // A malformed row must not sink the snapshot; that
                    // memory simply re-embeds after a restore.
                    warn!(memory_id = memory.id, error = %e, "unreadable embedding skipped");
                }
            }
        }
    }

    let working_memory = if include_working_memory {
        // Tolerate a store predating the working_memory table.
        let rows = match session_id {
            Some(session) => working_memory_ops::get_session(conn, session),
            None => working_memory_ops::get_all(conn),
        };
        match rows {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "working memory unavailable; snapshot proceeds without it");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let metadata = SnapshotMetadata {
        created_at: Utc::now(),
        memory_count: memories.len(),
        embedding_count: embeddings.len(),
        embedding_dimension: dimension,
        working_memory_count: working_memory.len(),
        session_id: session_id.map(str::to_string),
    };

    Ok(Snapshot {
        memories,
        embeddings,
        working_memory,
        metadata: Some(metadata),
    })
}

/// Oldest-beyond-cap and expired checkpoints go in one pass, inside the
/// caller's transaction.
fn prune_scope(
    conn: &Connection,
    scope: Option<&str>,
    max_checkpoints: usize,
    ttl_days: i64,
) -> MnemoResult<()> {
    let over_cap = conn
        .execute(
            "DELETE FROM checkpoints
             WHERE spec_folder IS ?1
               AND id NOT IN (
                   SELECT id FROM checkpoints WHERE spec_folder IS ?1
                   ORDER BY created_at DESC, id DESC LIMIT ?2
               )",
            params![scope, max_checkpoints as i64],
        )
        .map_err(|e| crate::storage_err(e.to_string()))?;

    let cutoff = (Utc::now() - Duration::days(ttl_days)).to_rfc3339();
    let expired = conn
        .execute(
            "DELETE FROM checkpoints
             WHERE MAX(created_at, COALESCE(last_used_at, created_at)) < ?1",
            params![cutoff],
        )
        .map_err(|e| crate::storage_err(e.to_string()))?;

    if over_cap + expired > 0 {
        info!(over_cap, expired, "pruned checkpoints");
    }
    Ok(())
}

fn fetch_checkpoint(
    conn: &Connection,
    name: &str,
) -> MnemoResult<(CheckpointDescriptor, Vec<u8>)> {
    let row = conn
        .prepare_cached(
            "SELECT id, name, created_at, last_used_at, spec_folder, git_branch, metadata, snapshot
             FROM checkpoints WHERE name = ?1",
        )
        .map_err(|e| crate::storage_err(e.to_string()))?
        .query_row(params![name], |row| {
            Ok((row_to_descriptor(row)?, row.get::<_, Vec<u8>>(7)?))
        })
        .optional()
        .map_err(|e| crate::storage_err(e.to_string()))?;

    row.ok_or_else(|| {
        CheckpointError::NotFound {
            name: name.to_string(),
        }
        .into()
    })
}

fn touch_last_used(conn: &Connection, name: &str) -> MnemoResult<()> {
    conn.execute(
        "UPDATE checkpoints SET last_used_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE name = ?1",
        params![name],
    )
    .map_err(|e| crate::storage_err(e.to_string()))?;
    Ok(())
}

fn row_to_descriptor(row: &rusqlite::Row<'_>) -> rusqlite::Result<CheckpointDescriptor> {
    let created_str: String = row.get(2)?;
    let last_used_str: Option<String> = row.get(3)?;
    let metadata_str: Option<String> = row.get(6)?;

    let parse = |s: &str| {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    };

    let metadata = metadata_str.and_then(|raw| match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "malformed checkpoint metadata JSON ignored");
            None
        }
    });

    Ok(CheckpointDescriptor {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse(&created_str)?,
        last_used_at: last_used_str.as_deref().map(parse).transpose()?,
        spec_folder: row.get(4)?,
        git_branch: row.get(5)?,
        metadata,
    })
}
