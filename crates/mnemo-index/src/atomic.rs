//! Atomic file-write-plus-index transactions.
//!
//! The file appears on disk strictly before the index row is visible.
//! When indexing fails after the write committed, the file is either
//! renamed aside as a pending file (recovered at next startup), deleted,
//! or left in place, per the caller's options.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use mnemo_core::constants::TMP_SUFFIX;
use mnemo_core::errors::MnemoResult;

use crate::pending::pending_path_for;

/// One save: destination path plus the full content to write.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub file_path: PathBuf,
    pub content: String,
}

/// Recovery policy when the index phase fails after the file committed.
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Delete the written file on index failure.
    pub rollback_on_failure: bool,
    /// Rename the written file to its pending name on index failure.
    /// Checked before `rollback_on_failure`.
    pub create_pending_on_failure: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            rollback_on_failure: false,
            create_pending_on_failure: true,
        }
    }
}

/// Terminal state of one atomic save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Success,
    RolledBack { reason: String },
    Pending { pending_path: PathBuf, reason: String },
    Failed { reason: String },
}

/// Counters the operator can inspect. Every save updates them.
#[derive(Debug, Default)]
struct AtomicityMetrics {
    success_count: AtomicU64,
    failure_count: AtomicU64,
    rollback_count: AtomicU64,
    pending_files_created: AtomicU64,
    last_failure: Mutex<Option<(String, DateTime<Utc>)>>,
}

/// Point-in-time copy of the metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub success_count: u64,
    pub failure_count: u64,
    pub rollback_count: u64,
    pub pending_files_created: u64,
    pub last_failure_reason: Option<String>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Executes atomic saves and owns their metrics.
#[derive(Debug, Default)]
pub struct TransactionManager {
    metrics: AtomicityMetrics,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let last = self
            .metrics
            .last_failure
            .lock()
            .expect("metrics mutex poisoned")
            .clone();
        MetricsSnapshot {
            success_count: self.metrics.success_count.load(Ordering::Relaxed),
            failure_count: self.metrics.failure_count.load(Ordering::Relaxed),
            rollback_count: self.metrics.rollback_count.load(Ordering::Relaxed),
            pending_files_created: self.metrics.pending_files_created.load(Ordering::Relaxed),
            last_failure_reason: last.as_ref().map(|(reason, _)| reason.clone()),
            last_failure_at: last.map(|(_, at)| at),
        }
    }

    fn note_failure(&self, reason: &str) {
        self.metrics.failure_count.fetch_add(1, Ordering::Relaxed);
        *self
            .metrics
            .last_failure
            .lock()
            .expect("metrics mutex poisoned") = Some((reason.to_string(), Utc::now()));
    }

    /// Write the file atomically, then run `index_fn`. Either both take
    /// effect, or the failure is converted into a recoverable state.
    pub async fn execute_atomic_save<F, Fut>(
        &self,
        request: SaveRequest,
        options: SaveOptions,
        index_fn: F,
    ) -> MnemoResult<SaveOutcome>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = MnemoResult<()>>,
    {
        // Write phase: tmp file, fsync, length check, atomic rename.
        // Until the rename lands, nothing is visible at the target path.
        if let Err(reason) = write_file_atomic(&request.file_path, &request.content).await {
            self.note_failure(&reason);
            return Ok(SaveOutcome::Failed { reason });
        }

        // Index phase. The file write has already committed, so this is
        // the one place a suspension inside the logical transaction is
        // allowed; rollback from here on is explicit, not implicit.
        let index_result = index_fn(request.file_path.clone()).await;
        let reason = match index_result {
            Ok(()) => {
                self.metrics.success_count.fetch_add(1, Ordering::Relaxed);
                return Ok(SaveOutcome::Success);
            }
            Err(e) => e.to_string(),
        };

        // Recovery phase: the file exists but the index row does not.
        self.note_failure(&reason);

        if options.create_pending_on_failure {
            let pending_path = pending_path_for(&request.file_path);
            match tokio::fs::rename(&request.file_path, &pending_path).await {
                Ok(()) => {
                    self.metrics
                        .pending_files_created
                        .fetch_add(1, Ordering::Relaxed);
                    info!(
                        pending = %pending_path.display(),
                        "index failed after write; file parked as pending"
                    );
                    return Ok(SaveOutcome::Pending {
                        pending_path,
                        reason,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "could not park failed save as pending");
                }
            }
        }

        if options.rollback_on_failure {
            if let Err(e) = tokio::fs::remove_file(&request.file_path).await {
                warn!(error = %e, "rollback delete failed; file left in place");
                return Ok(SaveOutcome::Failed { reason });
            }
            self.metrics.rollback_count.fetch_add(1, Ordering::Relaxed);
            return Ok(SaveOutcome::RolledBack { reason });
        }

        Ok(SaveOutcome::Failed { reason })
    }
}

/// Tmp-write, fsync, verify length, rename. On any failure the target
/// path is untouched and the tmp file is cleaned up best-effort.
async fn write_file_atomic(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("create parent dir: {e}"))?;
    }

    let mut tmp_os = path.as_os_str().to_os_string();
    tmp_os.push(TMP_SUFFIX);
    let tmp_path = PathBuf::from(tmp_os);

    let write_result: Result<(), String> = async {
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| format!("create tmp: {e}"))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| format!("write tmp: {e}"))?;
        file.sync_all().await.map_err(|e| format!("fsync tmp: {e}"))?;
        drop(file);

        let written = tokio::fs::metadata(&tmp_path)
            .await
            .map_err(|e| format!("stat tmp: {e}"))?
            .len();
        let expected = content.len() as u64;
        if written != expected {
            return Err(format!("short write: {written} of {expected} bytes"));
        }

        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| format!("rename tmp into place: {e}"))?;
        Ok(())
    }
    .await;

    if write_result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    write_result
}
