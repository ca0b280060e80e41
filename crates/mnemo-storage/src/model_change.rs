//! Embedding model drift detection.
//!
//! Compares the configured provider against the recorded
//! `embedding_model_info`. A changed model or dimension invalidates every
//! stored vector: the vector table is rebuilt and all successfully
//! embedded rows are requeued as pending.

use rusqlite::{params, Connection};
use tracing::info;

use mnemo_core::errors::MnemoResult;

use crate::to_storage_err;

/// Result of model drift detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelDrift {
    /// First run, nothing recorded yet.
    FirstRun,
    /// Recorded model matches the provider.
    NoChange,
    /// Model or dimension changed; affected rows were requeued.
    Requeued {
        old_model: String,
        old_dimension: usize,
        requeued: usize,
    },
}

/// Detect drift and requeue stale rows. Called once at store startup.
pub fn reconcile(
    conn: &Connection,
    model_name: &str,
    dimension: usize,
    vec_available: bool,
) -> MnemoResult<ModelDrift> {
    let stored: Option<(String, usize)> = conn
        .query_row(
            "SELECT model_name, dimension FROM embedding_model_info WHERE id = 1",
            [],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(to_storage_err(other.to_string())),
        })?;

    let drift = match stored {
        None => {
            record_model(conn, model_name, dimension)?;
            ModelDrift::FirstRun
        }
        Some((ref old_model, old_dimension))
            if old_model == model_name && old_dimension == dimension =>
        {
            ModelDrift::NoChange
        }
        Some((old_model, old_dimension)) => {
            info!(
                old_model = %old_model,
                new_model = %model_name,
                old_dimension,
                new_dimension = dimension,
                "embedding model change detected; requeueing indexed rows"
            );

            // Stored vectors are unusable at the new dimension. Rebuild
            // the virtual table so nothing of the old shape survives.
            if vec_available && old_dimension != dimension {
                conn.execute_batch(&format!(
                    "DROP TABLE IF EXISTS vec_memories;
                     CREATE VIRTUAL TABLE vec_memories USING vec0(embedding float[{dimension}])"
                ))
                .map_err(|e| to_storage_err(e.to_string()))?;
            }

            let requeued = conn
                .execute(
                    "UPDATE memory_index
                     SET embedding_status = 'pending',
                         retry_count = 0,
                         failure_reason = NULL,
                         embedding_model = ?1,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE embedding_status = 'success'",
                    params![model_name],
                )
                .map_err(|e| to_storage_err(e.to_string()))?;

            record_model(conn, model_name, dimension)?;
            ModelDrift::Requeued {
                old_model,
                old_dimension,
                requeued,
            }
        }
    };

    Ok(drift)
}

fn record_model(conn: &Connection, model_name: &str, dimension: usize) -> MnemoResult<()> {
    conn.execute(
        "INSERT INTO embedding_model_info (id, model_name, dimension)
         VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET
            model_name = excluded.model_name,
            dimension = excluded.dimension,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        params![model_name, dimension as i64],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
