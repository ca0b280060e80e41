//! v003: causal_edges.

use rusqlite::Connection;

use mnemo_core::errors::MnemoResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> MnemoResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS causal_edges (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id     TEXT NOT NULL,
            target_id     TEXT NOT NULL,
            relation      TEXT NOT NULL,
            strength      REAL NOT NULL DEFAULT 1.0,
            evidence      TEXT,
            extracted_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_causal_source ON causal_edges(source_id, strength);
        CREATE INDEX IF NOT EXISTS idx_causal_target ON causal_edges(target_id, strength);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
