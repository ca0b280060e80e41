//! v005: working_memory.

use rusqlite::Connection;

use mnemo_core::errors::MnemoResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> MnemoResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS working_memory (
            session_id           TEXT NOT NULL,
            memory_id            INTEGER NOT NULL,
            attention_score      REAL NOT NULL DEFAULT 0.0,
            last_mentioned_turn  INTEGER NOT NULL DEFAULT 0,
            tier                 TEXT NOT NULL DEFAULT 'normal',
            created_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (session_id, memory_id)
        );

        CREATE INDEX IF NOT EXISTS idx_working_memory_session ON working_memory(session_id);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
