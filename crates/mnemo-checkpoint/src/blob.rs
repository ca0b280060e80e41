//! Snapshot wire format: gzip over JSON.
//!
//! Two shapes exist in the wild. Writers emit the modern object; readers
//! accept both it and the legacy bare memory array. Decompression and
//! parse failures are reported as distinct stages.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use mnemo_core::errors::{CheckpointError, MnemoResult};
use mnemo_core::memory::MemoryRecord;
use mnemo_core::models::WorkingMemoryRow;

/// Snapshot-level bookkeeping, including the embedding dimension the
/// snapshot was taken under, validated again at restore time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub memory_count: usize,
    pub embedding_count: usize,
    pub embedding_dimension: usize,
    pub working_memory_count: usize,
    pub session_id: Option<String>,
}

/// One memory's embedding, keyed by its id at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingEntry {
    #[serde(alias = "memory_id")]
    pub memory_id: i64,
    pub embedding: Vec<f32>,
}

/// The decoded snapshot payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub memories: Vec<MemoryRecord>,
    pub embeddings: Vec<EmbeddingEntry>,
    #[serde(alias = "working_memory")]
    pub working_memory: Vec<WorkingMemoryRow>,
    pub metadata: Option<SnapshotMetadata>,
}

/// Both accepted wire shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotWire {
    Modern(Snapshot),
    Legacy(Vec<MemoryRecord>),
}

/// Serialize and gzip a snapshot.
pub fn encode(snapshot: &Snapshot) -> MnemoResult<(Vec<u8>, usize)> {
    let json = serde_json::to_vec(snapshot).map_err(|e| CheckpointError::CorruptBlob {
        name: String::new(),
        stage: "serialize",
        reason: e.to_string(),
    })?;
    let uncompressed_len = json.len();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .and_then(|_| encoder.finish())
        .map(|compressed| (compressed, uncompressed_len))
        .map_err(|e| {
            CheckpointError::CorruptBlob {
                name: String::new(),
                stage: "compress",
                reason: e.to_string(),
            }
            .into()
        })
}

/// Size of the uncompressed JSON a snapshot would serialize to, without
/// compressing. Used for the pre-compression size cap.
pub fn encoded_json_len(snapshot: &Snapshot) -> MnemoResult<usize> {
    serde_json::to_vec(snapshot)
        .map(|v| v.len())
        .map_err(|e| {
            CheckpointError::CorruptBlob {
                name: String::new(),
                stage: "serialize",
                reason: e.to_string(),
            }
            .into()
        })
}

/// Decompress and parse a stored blob. Returns the snapshot and whether
/// it used the legacy bare-array shape.
pub fn decode(name: &str, blob: &[u8]) -> MnemoResult<(Snapshot, bool)> {
    let mut decoder = GzDecoder::new(blob);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| CheckpointError::CorruptBlob {
            name: name.to_string(),
            stage: "decompress",
            reason: e.to_string(),
        })?;

    let wire: SnapshotWire =
        serde_json::from_slice(&json).map_err(|e| CheckpointError::CorruptBlob {
            name: name.to_string(),
            stage: "parse",
            reason: e.to_string(),
        })?;

    Ok(match wire {
        SnapshotWire::Modern(snapshot) => (snapshot, false),
        SnapshotWire::Legacy(memories) => (
            Snapshot {
                memories,
                ..Snapshot::default()
            },
            true,
        ),
    })
}
