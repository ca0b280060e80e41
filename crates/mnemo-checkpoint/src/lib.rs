//! # mnemo-checkpoint
//!
//! Named, gzip-compressed snapshots of memories plus their embeddings
//! and optional working-memory overlay; point-in-time restore with
//! UPSERT deduplication, id remapping, and dimension-aware embedding
//! rehydration.

pub mod blob;
pub mod engine;
pub mod git;
mod restore;

pub use blob::{EmbeddingEntry, Snapshot, SnapshotMetadata};
pub use engine::{CheckpointData, CheckpointEngine, CreateOptions};
pub use restore::RestoreOptions;

use mnemo_core::errors::{MnemoError, StorageError};

pub(crate) fn storage_err(message: impl Into<String>) -> MnemoError {
    StorageError::Sqlite {
        message: message.into(),
    }
    .into()
}
