//! Startup recovery of pending files.
//!
//! A pending file is a memory that reached disk but never reached the
//! index. Recovery renames it back and replays the index step; a file
//! that fails again is renamed back to pending for the next attempt.

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use mnemo_core::errors::{IndexError, MnemoResult};

use crate::pending::{is_pending, original_path_for};

/// Bounds one recovery sweep so startup never stalls on a huge backlog.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryOptions {
    pub max_files: usize,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self { max_files: 50 }
    }
}

/// What one sweep did.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Files renamed back and successfully indexed.
    pub recovered: Vec<PathBuf>,
    /// Files that failed again and were re-parked as pending.
    pub requeued: Vec<(PathBuf, String)>,
    /// Pending files found in the walk (before the max_files bound).
    pub found: usize,
}

/// Walk `base_path`, collect pending files, and replay indexing on up
/// to `max_files` of them.
pub async fn recover_all_pending<F, Fut>(
    base_path: &Path,
    options: RecoveryOptions,
    index_fn: F,
) -> MnemoResult<RecoveryReport>
where
    F: Fn(PathBuf) -> Fut,
    Fut: Future<Output = MnemoResult<()>>,
{
    let pending_files = collect_pending(base_path);
    let mut report = RecoveryReport {
        found: pending_files.len(),
        ..RecoveryReport::default()
    };

    for pending_path in pending_files.into_iter().take(options.max_files) {
        let Some(original) = original_path_for(&pending_path) else {
            continue;
        };

        // Confirm the file is still readable before moving it.
        if let Err(e) = tokio::fs::read(&pending_path).await {
            warn!(path = %pending_path.display(), error = %e, "pending file unreadable; skipped");
            report
                .requeued
                .push((pending_path, format!("unreadable: {e}")));
            continue;
        }

        tokio::fs::rename(&pending_path, &original)
            .await
            .map_err(|e| IndexError::Io {
                path: pending_path.display().to_string(),
                message: format!("restore rename: {e}"),
            })?;

        match index_fn(original.clone()).await {
            Ok(()) => {
                info!(path = %original.display(), "pending file recovered");
                report.recovered.push(original);
            }
            Err(e) => {
                // Park it again for the next sweep.
                let reason = e.to_string();
                if let Err(rename_err) = tokio::fs::rename(&original, &pending_path).await {
                    warn!(
                        path = %original.display(),
                        error = %rename_err,
                        "could not re-park failed recovery"
                    );
                }
                report.requeued.push((pending_path, reason));
            }
        }
    }

    Ok(report)
}

/// Enumerate pending files under a tree, skipping hidden directories
/// and dependency/build trees.
fn collect_pending(base_path: &Path) -> Vec<PathBuf> {
    WalkDir::new(base_path)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !(name.starts_with('.') || name == "node_modules" || name == "target")
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_pending(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}
