//! Per-file reindex decisions.
//!
//! The fast path matters: on large trees, skipping the SHA-256 pass when
//! the mtime is within the window is 10-100x cheaper than hashing every
//! file. The content-hash check behind it exists because editors and
//! formatters routinely touch mtime without changing bytes.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::debug;

use mnemo_core::constants::FAST_PATH_WINDOW_MS;
use mnemo_core::errors::{IndexError, MnemoResult};
use mnemo_core::memory::EmbeddingStatus;
use mnemo_storage::queries::memory_crud;
use mnemo_storage::MemoryStore;

use crate::hash::sha256_hex;

/// Options for a decision pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexerOptions {
    /// Re-embed regardless of stored state.
    pub force: bool,
    /// Override of the fast-path window, for tests.
    pub fast_path_window_ms: Option<i64>,
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    NewFile,
    ForceRequested,
    EmbeddingPending,
    EmbeddingRetry,
    EmbeddingFailed,
    ContentChanged,
    MtimeUnchanged,
    ContentUnchanged,
    FileNotFound,
}

/// Outcome of `should_reindex` for one file.
#[derive(Debug, Clone)]
pub enum ReindexDecision {
    /// Caller re-embeds and upserts the row.
    Reindex {
        reason: DecisionReason,
        mtime_ms: i64,
        /// Only computed when the decision required hashing.
        current_hash: Option<String>,
        stored_hash: Option<String>,
    },
    /// Nothing to embed. `new_mtime_ms` instructs the caller to persist
    /// the fresh mtime so the fast path works next time.
    Skip {
        reason: DecisionReason,
        fast_path: bool,
        memory_id: i64,
        new_mtime_ms: Option<i64>,
    },
    /// The file vanished between enumeration and inspection.
    NotFound { path: PathBuf },
}

impl ReindexDecision {
    pub fn reason(&self) -> DecisionReason {
        match self {
            Self::Reindex { reason, .. } | Self::Skip { reason, .. } => *reason,
            Self::NotFound { .. } => DecisionReason::FileNotFound,
        }
    }

    pub fn needs_reindex(&self) -> bool {
        matches!(self, Self::Reindex { .. })
    }
}

/// Decide whether one file must be re-embedded.
pub async fn should_reindex(
    store: &MemoryStore,
    file_path: &Path,
    options: IndexerOptions,
) -> MnemoResult<ReindexDecision> {
    let metadata = match tokio::fs::metadata(file_path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ReindexDecision::NotFound {
                path: file_path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(IndexError::Io {
                path: file_path.display().to_string(),
                message: e.to_string(),
            }
            .into());
        }
    };
    let mtime_ms = mtime_millis(file_path, &metadata)?;

    let path_str = file_path.to_string_lossy().to_string();
    let stored = store
        .with_conn(|conn| memory_crud::get_by_path(conn, &path_str))
        .await?;

    // No stored row: nothing to compare against, no hash needed yet.
    let Some(stored) = stored else {
        return Ok(ReindexDecision::Reindex {
            reason: DecisionReason::NewFile,
            mtime_ms,
            current_hash: None,
            stored_hash: None,
        });
    };

    if options.force {
        return Ok(ReindexDecision::Reindex {
            reason: DecisionReason::ForceRequested,
            mtime_ms,
            current_hash: None,
            stored_hash: stored.content_hash,
        });
    }

    match stored.embedding_status {
        EmbeddingStatus::Success => {}
        status => {
            let reason = match status {
                EmbeddingStatus::Retry => DecisionReason::EmbeddingRetry,
                EmbeddingStatus::Failed => DecisionReason::EmbeddingFailed,
                _ => DecisionReason::EmbeddingPending,
            };
            return Ok(ReindexDecision::Reindex {
                reason,
                mtime_ms,
                current_hash: None,
                stored_hash: stored.content_hash,
            });
        }
    }

    let window = options.fast_path_window_ms.unwrap_or(FAST_PATH_WINDOW_MS);
    if let Some(stored_mtime) = stored.file_mtime_ms {
        if (mtime_ms - stored_mtime).abs() < window {
            return Ok(ReindexDecision::Skip {
                reason: DecisionReason::MtimeUnchanged,
                fast_path: true,
                memory_id: stored.id,
                new_mtime_ms: None,
            });
        }
    }

    // Mtime moved (or was never recorded): hash to find out whether the
    // bytes actually changed.
    let bytes = tokio::fs::read(file_path).await.map_err(|e| IndexError::Io {
        path: file_path.display().to_string(),
        message: e.to_string(),
    })?;
    let current_hash = sha256_hex(&bytes);

    if stored.content_hash.as_deref() == Some(current_hash.as_str()) {
        debug!(path = %file_path.display(), "mtime moved but content unchanged");
        return Ok(ReindexDecision::Skip {
            reason: DecisionReason::ContentUnchanged,
            fast_path: false,
            memory_id: stored.id,
            new_mtime_ms: Some(mtime_ms),
        });
    }

    Ok(ReindexDecision::Reindex {
        reason: DecisionReason::ContentChanged,
        mtime_ms,
        current_hash: Some(current_hash),
        stored_hash: stored.content_hash,
    })
}

/// Aggregate counts from one `categorize` pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorizeStats {
    pub scanned: usize,
    pub fast_path_hits: usize,
    pub hashed: usize,
}

/// Result of applying `should_reindex` across a batch of paths.
#[derive(Debug, Default)]
pub struct CategorizeReport {
    pub needs_indexing: Vec<PathBuf>,
    /// `(memory_id, new_mtime_ms)` pairs for `batch_update_mtimes`.
    pub needs_mtime_update: Vec<(i64, i64)>,
    pub unchanged: Vec<PathBuf>,
    pub not_found: Vec<PathBuf>,
    pub stats: CategorizeStats,
}

/// Classify a batch of files.
pub async fn categorize(
    store: &MemoryStore,
    paths: &[PathBuf],
    options: IndexerOptions,
) -> MnemoResult<CategorizeReport> {
    let mut report = CategorizeReport::default();
    for path in paths {
        report.stats.scanned += 1;
        match should_reindex(store, path, options).await? {
            ReindexDecision::Reindex { current_hash, .. } => {
                if current_hash.is_some() {
                    report.stats.hashed += 1;
                }
                report.needs_indexing.push(path.clone());
            }
            ReindexDecision::Skip {
                fast_path,
                memory_id,
                new_mtime_ms,
                ..
            } => {
                if fast_path {
                    report.stats.fast_path_hits += 1;
                } else {
                    report.stats.hashed += 1;
                }
                match new_mtime_ms {
                    Some(mtime) => report.needs_mtime_update.push((memory_id, mtime)),
                    None => report.unchanged.push(path.clone()),
                }
            }
            ReindexDecision::NotFound { path } => report.not_found.push(path),
        }
    }
    Ok(report)
}

/// Persist the mtime-only updates a categorize pass produced, in one
/// transaction.
pub async fn batch_update_mtimes(
    store: &MemoryStore,
    updates: &[(i64, i64)],
) -> MnemoResult<usize> {
    store
        .with_conn(|conn| memory_crud::batch_update_mtimes(conn, updates))
        .await
}

fn mtime_millis(path: &Path, metadata: &std::fs::Metadata) -> MnemoResult<i64> {
    let modified = metadata.modified().map_err(|e| IndexError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).map_err(|e| IndexError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(since_epoch.as_millis() as i64)
}
