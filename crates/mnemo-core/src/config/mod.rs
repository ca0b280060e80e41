//! Engine configuration with defaults drawn from `constants`.

use serde::{Deserialize, Serialize};

use crate::constants;

/// Tunable knobs for the engine. `Default` mirrors the constants module;
/// individual components accept a config so tests can tighten thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Mtime window (ms) under which the indexer skips hashing.
    pub fast_path_window_ms: i64,
    /// Embedding attempts before a row is marked `failed`.
    pub max_embedding_retries: i64,
    /// Seconds a row must rest between embedding retries.
    pub retry_cooldown_secs: i64,
    /// Per-access accumulator increment.
    pub access_increment: f64,
    /// Accumulator value that triggers a per-id flush.
    pub access_flush_threshold: f64,
    /// Checkpoints kept per scope.
    pub max_checkpoints: usize,
    /// Days before an untouched checkpoint is pruned.
    pub checkpoint_ttl_days: i64,
    /// Uncompressed snapshot size cap in bytes.
    pub max_snapshot_bytes: usize,
    /// Hard cap on edges returned per causal query.
    pub max_edges_limit: usize,
    /// Upper clamp for causal traversal depth.
    pub max_traversal_depth: usize,
    /// History rows older than this many days are purged by maintenance.
    pub history_retention_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fast_path_window_ms: constants::FAST_PATH_WINDOW_MS,
            max_embedding_retries: constants::MAX_EMBEDDING_RETRIES,
            retry_cooldown_secs: constants::RETRY_COOLDOWN_SECS,
            access_increment: constants::ACCESS_INCREMENT,
            access_flush_threshold: constants::ACCESS_FLUSH_THRESHOLD,
            max_checkpoints: constants::MAX_CHECKPOINTS,
            checkpoint_ttl_days: constants::CHECKPOINT_TTL_DAYS,
            max_snapshot_bytes: constants::MAX_SNAPSHOT_BYTES,
            max_edges_limit: constants::MAX_EDGES_LIMIT,
            max_traversal_depth: constants::MAX_TRAVERSAL_DEPTH,
            history_retention_days: 90,
        }
    }
}
