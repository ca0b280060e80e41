//! Embedding lifecycle tracking: pending work selection, status
//! transitions, and per-status statistics.

use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use mnemo_core::constants::{MAX_EMBEDDING_RETRIES, RETRY_COOLDOWN_SECS};
use mnemo_core::errors::MnemoResult;
use mnemo_core::memory::MemoryRecord;

use super::memory_crud::{row_to_memory, MEMORY_COLUMNS};
use crate::to_storage_err;

/// Counts per embedding status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub pending: usize,
    pub retry: usize,
    pub success: usize,
    pub failed: usize,
    pub needs_refresh: bool,
}

/// Aggregate embedding status counts.
pub fn embedding_stats(conn: &Connection) -> MnemoResult<EmbeddingStats> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT embedding_status, COUNT(*) FROM memory_index GROUP BY embedding_status",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut stats = EmbeddingStats::default();
    for row in rows {
        let (status, count) = row.map_err(|e| to_storage_err(e.to_string()))?;
        match status.as_str() {
            "pending" => stats.pending = count,
            "retry" => stats.retry = count,
            "success" => stats.success = count,
            "failed" => stats.failed = count,
            _ => {}
        }
    }
    stats.needs_refresh = stats.pending > 0 || stats.retry > 0;
    Ok(stats)
}

/// Select rows awaiting embedding, oldest first, with a bounded retry
/// rate: rows inside the cooldown window or out of retry budget are
/// excluded.
pub fn get_unindexed_documents(
    conn: &Connection,
    limit: usize,
    include_retry: bool,
) -> MnemoResult<Vec<MemoryRecord>> {
    let cutoff = (Utc::now() - Duration::seconds(RETRY_COOLDOWN_SECS)).to_rfc3339();
    let statuses = if include_retry {
        "('pending', 'retry')"
    } else {
        "('pending')"
    };
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memory_index
             WHERE embedding_status IN {statuses}
               AND retry_count < ?1
               AND (last_retry_at IS NULL OR last_retry_at < ?2)
             ORDER BY created_at ASC
             LIMIT ?3"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(
            params![MAX_EMBEDDING_RETRIES, cutoff, limit as i64],
            row_to_memory,
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Mark a memory successfully embedded: status `success`, failure state
/// cleared, generation time stamped.
pub fn mark_indexed(conn: &Connection, id: i64, model_name: &str) -> MnemoResult<()> {
    conn.prepare_cached(
        "UPDATE memory_index SET
            embedding_status = 'success',
            embedding_model = ?2,
            failure_reason = NULL,
            embedding_generated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
    )
    .map_err(|e| to_storage_err(e.to_string()))?
    .execute(params![id, model_name])
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Record an embedding failure. Transitions to `failed` once the retry
/// budget is exhausted, otherwise to `retry` with the attempt stamped.
pub fn mark_failed(conn: &Connection, id: i64, reason: &str) -> MnemoResult<()> {
    conn.prepare_cached(
        "UPDATE memory_index SET
            retry_count = retry_count + 1,
            embedding_status = CASE
                WHEN retry_count + 1 >= ?3 THEN 'failed'
                ELSE 'retry'
            END,
            failure_reason = ?2,
            last_retry_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
    )
    .map_err(|e| to_storage_err(e.to_string()))?
    .execute(params![id, reason, MAX_EMBEDDING_RETRIES])
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Re-queue failed rows as pending with a fresh retry budget.
pub fn reset_failed(conn: &Connection, spec_folder: Option<&str>) -> MnemoResult<usize> {
    let rows = match spec_folder {
        Some(folder) => conn.execute(
            "UPDATE memory_index SET
                embedding_status = 'pending', retry_count = 0, failure_reason = NULL,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE embedding_status = 'failed' AND spec_folder = ?1",
            params![folder],
        ),
        None => conn.execute(
            "UPDATE memory_index SET
                embedding_status = 'pending', retry_count = 0, failure_reason = NULL,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE embedding_status = 'failed'",
            [],
        ),
    }
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(rows)
}

/// Force a memory back to pending (used when a restored vector does not
/// match the current dimension).
pub fn mark_pending(conn: &Connection, id: i64) -> MnemoResult<()> {
    conn.prepare_cached(
        "UPDATE memory_index SET
            embedding_status = 'pending',
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
    )
    .map_err(|e| to_storage_err(e.to_string()))?
    .execute(params![id])
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
