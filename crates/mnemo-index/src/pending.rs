//! Pending-file naming: `note.md` <-> `note_pending.md`.

use std::path::{Path, PathBuf};

use mnemo_core::constants::PENDING_MARKER;

/// The pending-side name for a file: marker inserted between basename
/// and extension.
pub fn pending_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}{PENDING_MARKER}.{ext}"),
        None => format!("{stem}{PENDING_MARKER}"),
    };
    path.with_file_name(name)
}

/// The original name for a pending file. Returns `None` when the
/// basename carries no pending marker.
pub fn original_path_for(pending: &Path) -> Option<PathBuf> {
    let stem = pending.file_stem()?.to_str()?;
    let stem = stem.strip_suffix(PENDING_MARKER)?;
    let name = match pending.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    };
    Some(pending.with_file_name(name))
}

/// Whether a path's basename marks it as pending.
pub fn is_pending(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(PENDING_MARKER))
}
