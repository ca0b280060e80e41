//! Versioned, additive-only schema migrations.
//!
//! Each migration is idempotent (`CREATE ... IF NOT EXISTS`, guarded
//! `ALTER TABLE ADD COLUMN`) and recorded in `schema_version`. Re-running
//! the full set against an up-to-date database is a no-op.

mod v001_memory_index;
mod v002_history_tables;
mod v003_causal_tables;
mod v004_checkpoint_tables;
mod v005_working_memory;
mod v006_context_columns;

use rusqlite::Connection;
use tracing::info;

use mnemo_core::errors::{MnemoResult, StorageError};

use crate::to_storage_err;

/// Highest known schema version.
pub const SCHEMA_VERSION: u32 = 6;

/// Run all outstanding migrations.
pub fn run_migrations(conn: &Connection) -> MnemoResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let steps: [(u32, fn(&Connection) -> MnemoResult<()>); 6] = [
        (1, v001_memory_index::migrate),
        (2, v002_history_tables::migrate),
        (3, v003_causal_tables::migrate),
        (4, v004_checkpoint_tables::migrate),
        (5, v005_working_memory::migrate),
        (6, v006_context_columns::migrate),
    ];

    for (version, migrate) in steps {
        if current < version {
            migrate(conn).map_err(|e| migration_err(version, e))?;
            conn.execute(
                "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
                [version],
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
            info!(version, "applied schema migration");
        }
    }

    Ok(())
}

fn migration_err(version: u32, source: mnemo_core::MnemoError) -> mnemo_core::MnemoError {
    StorageError::MigrationFailed {
        version,
        reason: source.to_string(),
    }
    .into()
}

/// Add a column if the table does not already have it. SQLite has no
/// `ADD COLUMN IF NOT EXISTS`, so presence is checked via table_info.
pub fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> MnemoResult<()> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let existing = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| to_storage_err(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))?;

    if !existing.iter().any(|name| name == column) {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
            .map_err(|e| to_storage_err(e.to_string()))?;
    }
    Ok(())
}
