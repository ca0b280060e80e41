//! v006: context_type and channel columns on memory_index.
//!
//! Additive only; existing rows read back NULL for both.

use rusqlite::Connection;

use mnemo_core::errors::MnemoResult;

use super::add_column_if_missing;

pub fn migrate(conn: &Connection) -> MnemoResult<()> {
    add_column_if_missing(conn, "memory_index", "context_type", "TEXT")?;
    add_column_if_missing(conn, "memory_index", "channel", "TEXT")?;
    Ok(())
}
