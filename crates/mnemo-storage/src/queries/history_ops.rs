//! Append-only history rows: record, query, purge.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;
use uuid::Uuid;

use mnemo_core::errors::MnemoResult;
use mnemo_core::models::{HistoryActor, HistoryEntry, HistoryEvent};

use super::parse_dt;
use crate::to_storage_err;

const HISTORY_COLUMNS: &str = "id, memory_id, event, actor, timestamp, prev_value, new_value";

/// Record one history event. Validates the event-specific field
/// requirements before touching the database.
pub fn record_history(
    conn: &Connection,
    memory_id: i64,
    event: HistoryEvent,
    actor: HistoryActor,
    prev_value: Option<&serde_json::Value>,
    new_value: Option<&serde_json::Value>,
) -> MnemoResult<String> {
    let entry = HistoryEntry {
        id: Uuid::new_v4().to_string(),
        memory_id,
        event,
        actor,
        timestamp: Utc::now(),
        prev_value: prev_value.cloned(),
        new_value: new_value.cloned(),
    };
    entry.validate()?;
    insert_entry(conn, &entry)?;
    Ok(entry.id)
}

pub(crate) fn insert_entry(conn: &Connection, entry: &HistoryEntry) -> MnemoResult<()> {
    conn.prepare_cached(
        "INSERT INTO memory_history (id, memory_id, event, actor, timestamp, prev_value, new_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .map_err(|e| to_storage_err(e.to_string()))?
    .execute(params![
        entry.id,
        entry.memory_id,
        entry.event.as_str(),
        entry.actor.as_str(),
        entry.timestamp.to_rfc3339(),
        entry.prev_value.as_ref().map(|v| v.to_string()),
        entry.new_value.as_ref().map(|v| v.to_string()),
    ])
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Events for one memory, ascending time.
pub fn get_history(
    conn: &Connection,
    memory_id: i64,
    limit: Option<usize>,
    since: Option<DateTime<Utc>>,
) -> MnemoResult<Vec<HistoryEntry>> {
    let since_str = since.map(|t| t.to_rfc3339()).unwrap_or_default();
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {HISTORY_COLUMNS} FROM memory_history
             WHERE memory_id = ?1 AND (?2 = '' OR timestamp >= ?2)
             ORDER BY timestamp ASC
             LIMIT ?3"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(
            params![memory_id, since_str, limit.map(|l| l as i64).unwrap_or(-1)],
            row_to_entry,
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Most recent events across all memories, descending time, optionally
/// filtered by event and/or actor.
pub fn get_recent_history(
    conn: &Connection,
    limit: usize,
    event: Option<HistoryEvent>,
    actor: Option<HistoryActor>,
) -> MnemoResult<Vec<HistoryEntry>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {HISTORY_COLUMNS} FROM memory_history
             WHERE (?1 = '' OR event = ?1) AND (?2 = '' OR actor = ?2)
             ORDER BY timestamp DESC
             LIMIT ?3"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(
            params![
                event.map(|e| e.as_str()).unwrap_or(""),
                actor.map(|a| a.as_str()).unwrap_or(""),
                limit as i64,
            ],
            row_to_entry,
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// The single most recent event for a memory.
pub fn latest_event(conn: &Connection, memory_id: i64) -> MnemoResult<Option<HistoryEntry>> {
    conn.prepare_cached(&format!(
        "SELECT {HISTORY_COLUMNS} FROM memory_history
         WHERE memory_id = ?1 ORDER BY timestamp DESC LIMIT 1"
    ))
    .map_err(|e| to_storage_err(e.to_string()))?
    .query_row(params![memory_id], row_to_entry)
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Delete history older than the retention window. Returns rows purged.
pub fn purge_old_history(conn: &Connection, days: i64) -> MnemoResult<usize> {
    let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
    let rows = conn
        .execute(
            "DELETE FROM memory_history WHERE timestamp < ?1",
            params![cutoff],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(rows)
}

/// Parse one row in `HISTORY_COLUMNS` order. Malformed payload JSON is
/// reported and surfaced as `None`; the read path never fails on it.
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let id: String = row.get(0)?;
    let event_str: String = row.get(2)?;
    let actor_str: String = row.get(3)?;
    let timestamp_str: String = row.get(4)?;
    let prev_raw: Option<String> = row.get(5)?;
    let new_raw: Option<String> = row.get(6)?;

    let parse_payload = |raw: Option<String>, field: &str| -> Option<serde_json::Value> {
        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(history_id = %id, field, error = %e, "malformed history payload JSON");
                None
            }
        }
    };

    let event = HistoryEvent::parse(&event_str).unwrap_or(HistoryEvent::Update);
    let timestamp = parse_dt(&timestamp_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })?;

    Ok(HistoryEntry {
        prev_value: parse_payload(prev_raw, "prev_value"),
        new_value: parse_payload(new_raw, "new_value"),
        id,
        memory_id: row.get(1)?,
        event,
        actor: HistoryActor::parse_lossy(&actor_str),
        timestamp,
    })
}
