//! Checkpoint descriptors and restore reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of `checkpoints` without the snapshot blob. Listings return
/// these; the blob is only decompressed by `get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDescriptor {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub spec_folder: Option<String>,
    pub git_branch: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Outcome counts for a restore run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub cleared: usize,
    pub deprecated: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub embeddings_restored: usize,
    pub embeddings_skipped: usize,
    pub embeddings_in_snapshot: usize,
    pub working_memory_restored: usize,
    /// Whether semantic search works immediately or a reindex pass is
    /// needed first.
    pub note: String,
}
