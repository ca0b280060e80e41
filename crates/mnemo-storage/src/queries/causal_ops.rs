//! Causal edge rows: validated insert, ordered queries, stats, orphans.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use mnemo_core::constants::MAX_EDGES_LIMIT;
use mnemo_core::errors::{CausalError, MnemoResult};
use mnemo_core::models::{CausalEdge, CausalRelation};

use super::parse_dt;
use crate::to_storage_err;

const EDGE_COLUMNS: &str = "id, source_id, target_id, relation, strength, evidence, extracted_at";

/// Insert one validated edge. Returns its id.
pub fn insert_edge(conn: &Connection, edge: &CausalEdge) -> MnemoResult<i64> {
    edge.validate()?;
    conn.prepare_cached(
        "INSERT INTO causal_edges (source_id, target_id, relation, strength, evidence, extracted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .map_err(|e| to_storage_err(e.to_string()))?
    .execute(params![
        edge.source_id,
        edge.target_id,
        edge.relation.as_str(),
        edge.strength,
        edge.evidence,
        edge.extracted_at.to_rfc3339(),
    ])
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

/// Insert a batch inside one transaction. A bad row is reported in its
/// slot without aborting the rest of the batch.
pub fn insert_edges_batch(
    conn: &Connection,
    edges: &[CausalEdge],
) -> MnemoResult<Vec<Result<i64, String>>> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("insert_edges_batch begin: {e}")))?;
    let mut results = Vec::with_capacity(edges.len());
    for edge in edges {
        results.push(insert_edge(&tx, edge).map_err(|e| e.to_string()));
    }
    tx.commit()
        .map_err(|e| to_storage_err(format!("insert_edges_batch commit: {e}")))?;
    Ok(results)
}

fn clamp_limit(limit: Option<usize>) -> i64 {
    limit.unwrap_or(MAX_EDGES_LIMIT).min(MAX_EDGES_LIMIT) as i64
}

/// Edges leaving a source, strongest first.
pub fn get_edges_from(
    conn: &Connection,
    source_id: &str,
    relation: Option<CausalRelation>,
    limit: Option<usize>,
) -> MnemoResult<Vec<CausalEdge>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {EDGE_COLUMNS} FROM causal_edges
             WHERE source_id = ?1 AND (?2 = '' OR relation = ?2)
             ORDER BY strength DESC, extracted_at DESC
             LIMIT ?3"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(
            params![
                source_id,
                relation.map(|r| r.as_str()).unwrap_or(""),
                clamp_limit(limit),
            ],
            row_to_edge,
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Edges arriving at a target, strongest first.
pub fn get_edges_to(
    conn: &Connection,
    target_id: &str,
    relation: Option<CausalRelation>,
    limit: Option<usize>,
) -> MnemoResult<Vec<CausalEdge>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {EDGE_COLUMNS} FROM causal_edges
             WHERE target_id = ?1 AND (?2 = '' OR relation = ?2)
             ORDER BY strength DESC, extracted_at DESC
             LIMIT ?3"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(
            params![
                target_id,
                relation.map(|r| r.as_str()).unwrap_or(""),
                clamp_limit(limit),
            ],
            row_to_edge,
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Every edge a memory participates in, either direction.
pub fn get_all_edges(conn: &Connection, memory_id: &str) -> MnemoResult<Vec<CausalEdge>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {EDGE_COLUMNS} FROM causal_edges
             WHERE source_id = ?1 OR target_id = ?1
             ORDER BY strength DESC, extracted_at DESC
             LIMIT ?2"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![memory_id, MAX_EDGES_LIMIT as i64], row_to_edge)
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Update strength and/or evidence. Nothing else on an edge is mutable.
pub fn update_edge(
    conn: &Connection,
    id: i64,
    strength: Option<f64>,
    evidence: Option<&str>,
) -> MnemoResult<()> {
    if let Some(value) = strength {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(CausalError::StrengthOutOfRange { value }.into());
        }
    }
    let rows = conn
        .prepare_cached(
            "UPDATE causal_edges SET
                strength = COALESCE(?2, strength),
                evidence = COALESCE(?3, evidence)
             WHERE id = ?1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?
        .execute(params![id, strength, evidence])
        .map_err(|e| to_storage_err(e.to_string()))?;
    if rows == 0 {
        return Err(CausalError::EdgeNotFound { id }.into());
    }
    Ok(())
}

/// Remove an edge by id. Returns whether a row was deleted.
pub fn delete_edge(conn: &Connection, id: i64) -> MnemoResult<bool> {
    let rows = conn
        .execute("DELETE FROM causal_edges WHERE id = ?1", params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(rows > 0)
}

/// Remove every edge a memory participates in. Called on memory
/// deletion. Returns edges removed.
pub fn delete_edges_for_memory(conn: &Connection, memory_id: &str) -> MnemoResult<usize> {
    let rows = conn
        .execute(
            "DELETE FROM causal_edges WHERE source_id = ?1 OR target_id = ?1",
            params![memory_id],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(rows)
}

/// Aggregate graph statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_edges: usize,
    pub unique_sources: usize,
    pub unique_targets: usize,
    pub edges_by_relation: Vec<(CausalRelation, usize)>,
    pub unique_memories: usize,
    /// Share of indexed memories participating in at least one edge.
    pub link_coverage: f64,
    pub average_strength: f64,
    pub earliest_extracted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub latest_extracted_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub fn graph_stats(conn: &Connection) -> MnemoResult<GraphStats> {
    let mut stats = GraphStats::default();

    let (total, sources, targets, avg, min_at, max_at): (
        i64,
        i64,
        i64,
        Option<f64>,
        Option<String>,
        Option<String>,
    ) = conn
        .query_row(
            "SELECT COUNT(*), COUNT(DISTINCT source_id), COUNT(DISTINCT target_id),
                    AVG(strength), MIN(extracted_at), MAX(extracted_at)
             FROM causal_edges",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

    stats.total_edges = total as usize;
    stats.unique_sources = sources as usize;
    stats.unique_targets = targets as usize;
    stats.average_strength = avg.unwrap_or(0.0);
    stats.earliest_extracted_at = min_at.as_deref().map(parse_dt).transpose()?;
    stats.latest_extracted_at = max_at.as_deref().map(parse_dt).transpose()?;

    let mut stmt = conn
        .prepare_cached("SELECT relation, COUNT(*) FROM causal_edges GROUP BY relation")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    for row in rows {
        let (relation, count) = row.map_err(|e| to_storage_err(e.to_string()))?;
        if let Ok(relation) = CausalRelation::parse(&relation) {
            stats.edges_by_relation.push((relation, count));
        }
    }

    let unique_memories: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM (
                SELECT source_id AS id FROM causal_edges
                UNION
                SELECT target_id AS id FROM causal_edges
             )",
            [],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    stats.unique_memories = unique_memories as usize;

    let total_memories = super::memory_crud::count_memories(conn, None)?;
    stats.link_coverage = if total_memories == 0 {
        0.0
    } else {
        // Coverage only counts graph endpoints that are real memories.
        let linked: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT m.id) FROM memory_index m
                 JOIN causal_edges e
                   ON CAST(m.id AS TEXT) = e.source_id
                   OR CAST(m.id AS TEXT) = e.target_id",
                [],
                |row| row.get(0),
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
        linked as f64 / total_memories as f64
    };

    Ok(stats)
}

/// Edges pointing at memories that no longer exist. Allowed to exist,
/// but detectable for cleanup.
pub fn find_orphaned_edges(conn: &Connection) -> MnemoResult<Vec<CausalEdge>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM causal_edges e
             WHERE NOT EXISTS (
                     SELECT 1 FROM memory_index m WHERE CAST(m.id AS TEXT) = e.source_id
                   )
                OR NOT EXISTS (
                     SELECT 1 FROM memory_index m WHERE CAST(m.id AS TEXT) = e.target_id
                   )"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], row_to_edge)
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<CausalEdge> {
    let relation_str: String = row.get(3)?;
    let extracted_str: String = row.get(6)?;
    let relation = CausalRelation::parse(&relation_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })?;
    let extracted_at = parse_dt(&extracted_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })?;
    Ok(CausalEdge {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relation,
        strength: row.get(4)?,
        evidence: row.get(5)?,
        extracted_at,
    })
}
