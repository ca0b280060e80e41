//! v004: checkpoints.

use rusqlite::Connection;

use mnemo_core::errors::MnemoResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> MnemoResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS checkpoints (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            name          TEXT NOT NULL UNIQUE,
            created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            last_used_at  TEXT,
            spec_folder   TEXT,
            git_branch    TEXT,
            snapshot      BLOB NOT NULL,
            metadata      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_checkpoints_scope ON checkpoints(spec_folder, created_at);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
