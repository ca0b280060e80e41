//! vec_memories row operations and similarity search.
//!
//! The embedding column is an opaque little-endian byte slice whose
//! length must equal `4 x dimension`; both codec directions validate
//! length before anything else.

use rusqlite::{params, Connection};
use tracing::warn;

use mnemo_core::errors::{MnemoResult, StorageError};

use crate::to_storage_err;

/// Convert an f32 slice to little-endian bytes.
pub fn f32s_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes back to f32s, rejecting any length that is not exactly
/// `4 x expected_dim`.
pub fn bytes_to_f32s(bytes: &[u8], expected_dim: usize) -> MnemoResult<Vec<f32>> {
    if bytes.len() != expected_dim * 4 {
        return Err(StorageError::VectorLength {
            expected: expected_dim * 4,
            actual: bytes.len(),
        }
        .into());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Insert or replace the vector row for a memory at `rowid = memory_id`.
pub fn store_embedding(
    conn: &Connection,
    memory_id: i64,
    embedding: &[f32],
    dimension: usize,
) -> MnemoResult<()> {
    if embedding.len() != dimension {
        return Err(StorageError::VectorLength {
            expected: dimension * 4,
            actual: embedding.len() * 4,
        }
        .into());
    }
    conn.prepare_cached(
        "INSERT OR REPLACE INTO vec_memories (rowid, embedding) VALUES (?1, ?2)",
    )
    .map_err(|e| to_storage_err(e.to_string()))?
    .execute(params![memory_id, f32s_to_bytes(embedding)])
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Read the vector row for a memory, if present.
pub fn get_embedding(
    conn: &Connection,
    memory_id: i64,
    dimension: usize,
) -> MnemoResult<Option<Vec<f32>>> {
    let blob: Option<Vec<u8>> = match conn.query_row(
        "SELECT embedding FROM vec_memories WHERE rowid = ?1",
        params![memory_id],
        |row| row.get(0),
    ) {
        Ok(blob) => Some(blob),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(to_storage_err(e.to_string())),
    };
    blob.map(|b| bytes_to_f32s(&b, dimension)).transpose()
}

/// Best-effort vector row deletion. Tolerates a missing virtual table
/// and transient SQLITE_BUSY. This is the one place those are
/// whitelisted; anywhere else they propagate.
pub fn delete_embedding(conn: &Connection, memory_id: i64) -> MnemoResult<()> {
    match conn.execute(
        "DELETE FROM vec_memories WHERE rowid = ?1",
        params![memory_id],
    ) {
        Ok(_) => Ok(()),
        Err(e) => {
            let message = e.to_string();
            if message.contains("no such table") || message.contains("database is locked") {
                warn!(memory_id, error = %message, "vector row cleanup skipped");
                Ok(())
            } else {
                Err(to_storage_err(message))
            }
        }
    }
}

/// K-nearest-neighbour search. Returns `(memory_id, similarity)` pairs,
/// most similar first. Falls back to a full scan with in-process cosine
/// when the vec0 MATCH syntax is not supported by the loaded extension.
pub fn search_similar(
    conn: &Connection,
    query: &[f32],
    limit: usize,
) -> MnemoResult<Vec<(i64, f64)>> {
    let blob = f32s_to_bytes(query);
    let knn = conn
        .prepare_cached(
            "SELECT rowid, distance FROM vec_memories
             WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        )
        .and_then(|mut stmt| {
            stmt.query_map(params![blob, limit as i64], |row| {
                let id: i64 = row.get(0)?;
                let distance: f64 = row.get(1)?;
                Ok((id, 1.0 - distance / 2.0))
            })?
            .collect::<Result<Vec<_>, _>>()
        });

    match knn {
        Ok(results) => Ok(results),
        Err(e) => {
            warn!(error = %e, "vec0 KNN query failed; scanning with in-process cosine");
            brute_force_scan(conn, query, limit)
        }
    }
}

fn brute_force_scan(
    conn: &Connection,
    query: &[f32],
    limit: usize,
) -> MnemoResult<Vec<(i64, f64)>> {
    let mut stmt = conn
        .prepare("SELECT rowid, embedding FROM vec_memories")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut scored = Vec::new();
    for row in rows {
        let (id, blob) = row.map_err(|e| to_storage_err(e.to_string()))?;
        // Skip foreign-dimension rows instead of failing the scan.
        let Ok(stored) = bytes_to_f32s(&blob, query.len()) else {
            continue;
        };
        let similarity = cosine_similarity(query, &stored);
        scored.push((id, similarity));
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    Ok(scored)
}

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_codec_roundtrip() {
        let v = vec![0.25_f32, -1.5, 3.75];
        let bytes = f32s_to_bytes(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_f32s(&bytes, 3).unwrap(), v);
    }

    #[test]
    fn byte_codec_rejects_wrong_length() {
        let bytes = f32s_to_bytes(&[1.0_f32, 2.0]);
        assert!(bytes_to_f32s(&bytes, 3).is_err());
        assert!(bytes_to_f32s(&bytes[..7], 2).is_err());
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
