//! # mnemo-storage
//!
//! SQLite persistence layer for the mnemo memory engine: the store
//! handle, versioned migrations, query modules, history with one-step
//! undo, the batched access tracker, and the embedding refresh
//! coordinator.

pub mod access;
pub mod connection;
pub mod engine;
pub mod migrations;
pub mod model_change;
pub mod pragmas;
pub mod queries;
pub mod undo;

pub use access::AccessTracker;
pub use engine::MemoryStore;

use mnemo_core::errors::{MnemoError, StorageError};

/// Map a low-level SQLite failure into the storage error domain.
pub(crate) fn to_storage_err(message: impl Into<String>) -> MnemoError {
    StorageError::Sqlite {
        message: message.into(),
    }
    .into()
}
