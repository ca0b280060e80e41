//! Access-count increment SQL. The in-memory batching lives in
//! `crate::access`; this module only applies already-batched increments.

use rusqlite::{params, Connection};

use mnemo_core::errors::MnemoResult;

use crate::to_storage_err;

/// Apply one integer increment to a memory's access count and stamp
/// `last_accessed`.
pub fn apply_increment(conn: &Connection, id: i64, increment: i64) -> MnemoResult<()> {
    conn.prepare_cached(
        "UPDATE memory_index SET
            access_count = access_count + ?2,
            last_accessed = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
    )
    .map_err(|e| to_storage_err(e.to_string()))?
    .execute(params![id, increment])
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Apply many increments inside one transaction.
pub fn apply_increments(conn: &Connection, increments: &[(i64, i64)]) -> MnemoResult<()> {
    if increments.is_empty() {
        return Ok(());
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("apply_increments begin: {e}")))?;
    for (id, increment) in increments {
        apply_increment(&tx, *id, *increment)?;
    }
    tx.commit()
        .map_err(|e| to_storage_err(format!("apply_increments commit: {e}")))?;
    Ok(())
}
