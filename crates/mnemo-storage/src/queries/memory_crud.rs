//! Insert, get, update, delete, and list operations for memory rows.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use mnemo_core::errors::MnemoResult;
use mnemo_core::memory::{EmbeddingStatus, ImportanceTier, MemoryRecord};
use mnemo_core::MnemoError;

use super::{parse_dt, parse_dt_opt};
use crate::to_storage_err;

/// Canonical column list shared by every SELECT in this module.
pub(crate) const MEMORY_COLUMNS: &str = "id, file_path, content_hash, file_mtime_ms, title, \
     anchor_id, trigger_phrases, importance_weight, importance_tier, embedding_model, \
     embedding_status, retry_count, last_retry_at, failure_reason, embedding_generated_at, \
     context_type, channel, created_at, updated_at, access_count, last_accessed, spec_folder";

/// Insert a memory and return its new id.
pub fn insert_memory(conn: &Connection, memory: &MemoryRecord) -> MnemoResult<i64> {
    insert_inner(conn, memory).map_err(|e| to_storage_err(e.to_string()))
}

/// Insert a memory, treating a unique-constraint violation on
/// (file_path, spec_folder) as a non-fatal duplicate: returns `Ok(None)`
/// instead of aborting the caller's batch.
pub fn try_insert_memory(conn: &Connection, memory: &MemoryRecord) -> MnemoResult<Option<i64>> {
    match insert_inner(conn, memory) {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            warn!(
                file_path = memory.file_path.as_deref().unwrap_or(""),
                spec_folder = %memory.spec_folder,
                "duplicate (file_path, spec_folder) on insert; row skipped"
            );
            Ok(None)
        }
        Err(e) => Err(to_storage_err(e.to_string())),
    }
}

fn insert_inner(conn: &Connection, memory: &MemoryRecord) -> rusqlite::Result<i64> {
    let trigger_json =
        serde_json::to_string(&memory.trigger_phrases).unwrap_or_else(|_| "[]".to_string());
    conn.prepare_cached(
        "INSERT INTO memory_index (
            file_path, content_hash, file_mtime_ms, title, anchor_id, trigger_phrases,
            importance_weight, importance_tier, embedding_model, embedding_status,
            retry_count, last_retry_at, failure_reason, embedding_generated_at,
            context_type, channel, created_at, updated_at, access_count, last_accessed,
            spec_folder
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                  ?17, ?18, ?19, ?20, ?21)",
    )?
    .execute(params![
        memory.file_path,
        memory.content_hash,
        memory.file_mtime_ms,
        memory.title,
        memory.anchor_id,
        trigger_json,
        memory.importance_weight,
        memory.importance_tier.as_str(),
        memory.embedding_model,
        memory.embedding_status.as_str(),
        memory.retry_count,
        memory.last_retry_at.map(|t| t.to_rfc3339()),
        memory.failure_reason,
        memory.embedding_generated_at.map(|t| t.to_rfc3339()),
        memory.context_type,
        memory.channel,
        memory.created_at.to_rfc3339(),
        memory.updated_at.to_rfc3339(),
        memory.access_count,
        memory.last_accessed.map(|t| t.to_rfc3339()),
        memory.spec_folder,
    ])?;
    Ok(conn.last_insert_rowid())
}

/// Insert a memory under an explicit id. Used when a deleted row is
/// reinstated and must keep its old identity.
pub fn insert_memory_with_id(conn: &Connection, memory: &MemoryRecord) -> MnemoResult<()> {
    let trigger_json =
        serde_json::to_string(&memory.trigger_phrases).unwrap_or_else(|_| "[]".to_string());
    conn.prepare_cached(
        "INSERT INTO memory_index (
            id, file_path, content_hash, file_mtime_ms, title, anchor_id, trigger_phrases,
            importance_weight, importance_tier, embedding_model, embedding_status,
            retry_count, last_retry_at, failure_reason, embedding_generated_at,
            context_type, channel, created_at, updated_at, access_count, last_accessed,
            spec_folder
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                  ?17, ?18, ?19, ?20, ?21, ?22)",
    )
    .map_err(|e| to_storage_err(e.to_string()))?
    .execute(params![
        memory.id,
        memory.file_path,
        memory.content_hash,
        memory.file_mtime_ms,
        memory.title,
        memory.anchor_id,
        trigger_json,
        memory.importance_weight,
        memory.importance_tier.as_str(),
        memory.embedding_model,
        memory.embedding_status.as_str(),
        memory.retry_count,
        memory.last_retry_at.map(|t| t.to_rfc3339()),
        memory.failure_reason,
        memory.embedding_generated_at.map(|t| t.to_rfc3339()),
        memory.context_type,
        memory.channel,
        memory.created_at.to_rfc3339(),
        memory.updated_at.to_rfc3339(),
        memory.access_count,
        memory.last_accessed.map(|t| t.to_rfc3339()),
        memory.spec_folder,
    ])
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Get a memory by id.
pub fn get_memory(conn: &Connection, id: i64) -> MnemoResult<Option<MemoryRecord>> {
    let row = conn
        .prepare_cached(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memory_index WHERE id = ?1"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?
        .query_row(params![id], row_to_memory)
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(row)
}

/// Look up the indexed row for a file path.
pub fn get_by_path(conn: &Connection, file_path: &str) -> MnemoResult<Option<MemoryRecord>> {
    let row = conn
        .prepare_cached(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memory_index WHERE file_path = ?1 LIMIT 1"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?
        .query_row(params![file_path], row_to_memory)
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(row)
}

/// Update every mutable column of an existing memory.
pub fn update_memory(conn: &Connection, memory: &MemoryRecord) -> MnemoResult<()> {
    let trigger_json =
        serde_json::to_string(&memory.trigger_phrases).unwrap_or_else(|_| "[]".to_string());
    let rows = conn
        .prepare_cached(
            "UPDATE memory_index SET
                file_path = ?2, content_hash = ?3, file_mtime_ms = ?4, title = ?5,
                anchor_id = ?6, trigger_phrases = ?7, importance_weight = ?8,
                importance_tier = ?9, embedding_model = ?10, embedding_status = ?11,
                retry_count = ?12, last_retry_at = ?13, failure_reason = ?14,
                embedding_generated_at = ?15, context_type = ?16, channel = ?17,
                access_count = ?18, last_accessed = ?19, spec_folder = ?20,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?
        .execute(params![
            memory.id,
            memory.file_path,
            memory.content_hash,
            memory.file_mtime_ms,
            memory.title,
            memory.anchor_id,
            trigger_json,
            memory.importance_weight,
            memory.importance_tier.as_str(),
            memory.embedding_model,
            memory.embedding_status.as_str(),
            memory.retry_count,
            memory.last_retry_at.map(|t| t.to_rfc3339()),
            memory.failure_reason,
            memory.embedding_generated_at.map(|t| t.to_rfc3339()),
            memory.context_type,
            memory.channel,
            memory.access_count,
            memory.last_accessed.map(|t| t.to_rfc3339()),
            memory.spec_folder,
        ])
        .map_err(|e| to_storage_err(e.to_string()))?;

    if rows == 0 {
        return Err(MnemoError::MemoryNotFound { id: memory.id });
    }
    Ok(())
}

/// Set only title, importance weight, and tier, the undo path's
/// restoration surface.
pub fn update_undo_fields(
    conn: &Connection,
    id: i64,
    title: Option<&str>,
    importance_weight: Option<f64>,
    importance_tier: Option<ImportanceTier>,
) -> MnemoResult<usize> {
    let rows = conn
        .prepare_cached(
            "UPDATE memory_index SET
                title = COALESCE(?2, title),
                importance_weight = COALESCE(?3, importance_weight),
                importance_tier = COALESCE(?4, importance_tier),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?
        .execute(params![
            id,
            title,
            importance_weight,
            importance_tier.map(|t| t.as_str()),
        ])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(rows)
}

/// Soft-delete: park the row in the deprecated tier, preserving history.
pub fn deprecate_memory(conn: &Connection, id: i64) -> MnemoResult<()> {
    let rows = conn
        .prepare_cached(
            "UPDATE memory_index SET
                importance_tier = 'deprecated',
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?
        .execute(params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    if rows == 0 {
        return Err(MnemoError::MemoryNotFound { id });
    }
    Ok(())
}

/// Hard-delete a memory and everything it owns: history rows, the
/// vector row, working-memory overlay rows, and causal edges touching
/// it. All-or-nothing.
pub fn delete_memory(conn: &Connection, id: i64) -> MnemoResult<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("delete_memory begin: {e}")))?;

    match delete_memory_inner(&tx, id) {
        Ok(()) => {
            tx.commit()
                .map_err(|e| to_storage_err(format!("delete_memory commit: {e}")))?;
            Ok(())
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn delete_memory_inner(conn: &Connection, id: i64) -> MnemoResult<()> {
    conn.execute(
        "DELETE FROM memory_history WHERE memory_id = ?1",
        params![id],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    super::vector_ops::delete_embedding(conn, id)?;

    conn.execute(
        "DELETE FROM working_memory WHERE memory_id = ?1",
        params![id],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let id_str = id.to_string();
    conn.execute(
        "DELETE FROM causal_edges WHERE source_id = ?1 OR target_id = ?1",
        params![id_str],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    conn.execute("DELETE FROM memory_index WHERE id = ?1", params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// List memories, optionally scoped to one spec folder.
pub fn list_memories(
    conn: &Connection,
    spec_folder: Option<&str>,
) -> MnemoResult<Vec<MemoryRecord>> {
    let (sql, folder) = match spec_folder {
        Some(folder) => (
            format!(
                "SELECT {MEMORY_COLUMNS} FROM memory_index WHERE spec_folder = ?1 ORDER BY id"
            ),
            Some(folder),
        ),
        None => (
            format!("SELECT {MEMORY_COLUMNS} FROM memory_index ORDER BY id"),
            None,
        ),
    };
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(e.to_string()))?;

    let rows = match folder {
        Some(folder) => stmt.query_map(params![folder], row_to_memory),
        None => stmt.query_map([], row_to_memory),
    }
    .map_err(|e| to_storage_err(e.to_string()))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Total indexed memories, optionally scoped.
pub fn count_memories(conn: &Connection, spec_folder: Option<&str>) -> MnemoResult<usize> {
    let count: i64 = match spec_folder {
        Some(folder) => conn.query_row(
            "SELECT COUNT(*) FROM memory_index WHERE spec_folder = ?1",
            params![folder],
            |row| row.get(0),
        ),
        None => conn.query_row("SELECT COUNT(*) FROM memory_index", [], |row| row.get(0)),
    }
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(count as usize)
}

/// Persist mtime-only updates, one transaction for the whole batch.
/// Keeps the indexer's fast path accurate after a touch-without-change.
pub fn batch_update_mtimes(conn: &Connection, updates: &[(i64, i64)]) -> MnemoResult<usize> {
    if updates.is_empty() {
        return Ok(0);
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("batch_update_mtimes begin: {e}")))?;
    let mut applied = 0;
    for (id, mtime_ms) in updates {
        applied += tx
            .prepare_cached(
                "UPDATE memory_index SET file_mtime_ms = ?2,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
            )
            .map_err(|e| to_storage_err(e.to_string()))?
            .execute(params![id, mtime_ms])
            .map_err(|e| to_storage_err(e.to_string()))?;
    }
    tx.commit()
        .map_err(|e| to_storage_err(format!("batch_update_mtimes commit: {e}")))?;
    Ok(applied)
}

/// Parse one row in `MEMORY_COLUMNS` order.
pub(crate) fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let trigger_json: String = row.get(6)?;
    let trigger_phrases = serde_json::from_str(&trigger_json).unwrap_or_else(|e| {
        warn!(error = %e, "malformed trigger_phrases JSON; treating as empty");
        Vec::new()
    });

    let tier: String = row.get(8)?;
    let status: String = row.get(10)?;

    let to_col_err = |e: mnemo_core::MnemoError| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    };

    Ok(MemoryRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        content_hash: row.get(2)?,
        file_mtime_ms: row.get(3)?,
        title: row.get(4)?,
        anchor_id: row.get(5)?,
        trigger_phrases,
        importance_weight: row.get(7)?,
        importance_tier: ImportanceTier::parse_lossy(&tier),
        embedding_model: row.get(9)?,
        embedding_status: EmbeddingStatus::parse_lossy(&status),
        retry_count: row.get(11)?,
        last_retry_at: parse_dt_opt(row.get(12)?).map_err(to_col_err)?,
        failure_reason: row.get(13)?,
        embedding_generated_at: parse_dt_opt(row.get(14)?).map_err(to_col_err)?,
        context_type: row.get(15)?,
        channel: row.get(16)?,
        created_at: parse_dt(&row.get::<_, String>(17)?).map_err(to_col_err)?,
        updated_at: parse_dt(&row.get::<_, String>(18)?).map_err(to_col_err)?,
        access_count: row.get(19)?,
        last_accessed: parse_dt_opt(row.get(20)?).map_err(to_col_err)?,
        spec_folder: row.get(21)?,
    })
}
