//! v001: memory_index, embedding_model_info.

use rusqlite::Connection;

use mnemo_core::errors::MnemoResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> MnemoResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS memory_index (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path               TEXT,
            content_hash            TEXT,
            file_mtime_ms           INTEGER,
            title                   TEXT NOT NULL DEFAULT '',
            anchor_id               TEXT NOT NULL DEFAULT '',
            trigger_phrases         TEXT NOT NULL DEFAULT '[]',
            importance_weight       REAL NOT NULL DEFAULT 0.5,
            importance_tier         TEXT NOT NULL DEFAULT 'normal',
            embedding_model         TEXT,
            embedding_status        TEXT NOT NULL DEFAULT 'pending',
            retry_count             INTEGER NOT NULL DEFAULT 0,
            last_retry_at           TEXT,
            failure_reason          TEXT,
            embedding_generated_at  TEXT,
            created_at              TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at              TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            access_count            INTEGER NOT NULL DEFAULT 0,
            last_accessed           TEXT,
            spec_folder             TEXT NOT NULL DEFAULT ''
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_memory_file_per_folder
            ON memory_index(file_path, spec_folder) WHERE file_path IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_memory_spec_folder ON memory_index(spec_folder);
        CREATE INDEX IF NOT EXISTS idx_memory_embedding_status ON memory_index(embedding_status);
        CREATE INDEX IF NOT EXISTS idx_memory_created_at ON memory_index(created_at);
        CREATE INDEX IF NOT EXISTS idx_memory_tier ON memory_index(importance_tier);

        CREATE TABLE IF NOT EXISTS embedding_model_info (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            model_name  TEXT NOT NULL,
            dimension   INTEGER NOT NULL,
            updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
