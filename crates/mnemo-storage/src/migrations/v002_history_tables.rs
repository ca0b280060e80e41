//! v002: memory_history.

use rusqlite::Connection;

use mnemo_core::errors::MnemoResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> MnemoResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS memory_history (
            id          TEXT PRIMARY KEY,
            memory_id   INTEGER NOT NULL,
            event       TEXT NOT NULL,
            actor       TEXT NOT NULL DEFAULT 'system',
            timestamp   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            prev_value  TEXT,
            new_value   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_history_memory ON memory_history(memory_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_history_timestamp ON memory_history(timestamp);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
