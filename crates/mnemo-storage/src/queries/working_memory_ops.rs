//! Session-scoped working-memory overlay rows.

use rusqlite::{params, Connection};

use mnemo_core::errors::MnemoResult;
use mnemo_core::memory::ImportanceTier;
use mnemo_core::models::WorkingMemoryRow;

use super::{parse_dt, parse_dt_opt};
use crate::to_storage_err;

const WM_COLUMNS: &str =
    "session_id, memory_id, attention_score, last_mentioned_turn, tier, created_at, updated_at";

/// Insert or refresh one overlay row.
pub fn upsert(conn: &Connection, row: &WorkingMemoryRow) -> MnemoResult<()> {
    conn.prepare_cached(
        "INSERT INTO working_memory
            (session_id, memory_id, attention_score, last_mentioned_turn, tier, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(session_id, memory_id) DO UPDATE SET
            attention_score = excluded.attention_score,
            last_mentioned_turn = excluded.last_mentioned_turn,
            tier = excluded.tier,
            updated_at = excluded.updated_at",
    )
    .map_err(|e| to_storage_err(e.to_string()))?
    .execute(params![
        row.session_id,
        row.memory_id,
        row.attention_score,
        row.last_mentioned_turn,
        row.tier.as_str(),
        row.created_at.to_rfc3339(),
        row.updated_at.to_rfc3339(),
    ])
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Overlay rows for one session.
pub fn get_session(conn: &Connection, session_id: &str) -> MnemoResult<Vec<WorkingMemoryRow>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {WM_COLUMNS} FROM working_memory WHERE session_id = ?1
             ORDER BY attention_score DESC"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![session_id], row_to_wm)
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Overlay rows across every session.
pub fn get_all(conn: &Connection) -> MnemoResult<Vec<WorkingMemoryRow>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {WM_COLUMNS} FROM working_memory ORDER BY session_id, attention_score DESC"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], row_to_wm)
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Drop every overlay row for a session. Returns rows removed.
pub fn clear_session(conn: &Connection, session_id: &str) -> MnemoResult<usize> {
    let rows = conn
        .execute(
            "DELETE FROM working_memory WHERE session_id = ?1",
            params![session_id],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(rows)
}

fn row_to_wm(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkingMemoryRow> {
    let tier: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    let updated_str: Option<String> = row.get(6)?;
    let to_col_err = |e: mnemo_core::MnemoError| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    };
    let created_at = parse_dt(&created_str).map_err(to_col_err)?;
    let updated_at = parse_dt_opt(updated_str).map_err(to_col_err)?.unwrap_or(created_at);
    Ok(WorkingMemoryRow {
        session_id: row.get(0)?,
        memory_id: row.get(1)?,
        attention_score: row.get(2)?,
        last_mentioned_turn: row.get(3)?,
        tier: ImportanceTier::parse_lossy(&tier),
        created_at,
        updated_at,
    })
}
