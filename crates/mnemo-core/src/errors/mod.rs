//! Error types for the mnemo workspace.
//!
//! One enum per domain, aggregated into `MnemoError`. Library code
//! propagates with `?`; only tolerated failures (best-effort cleanup,
//! malformed stored JSON) are downgraded to `tracing::warn!`.

mod causal_error;
mod checkpoint_error;
mod index_error;
mod storage_error;

pub use causal_error::CausalError;
pub use checkpoint_error::CheckpointError;
pub use index_error::IndexError;
pub use storage_error::StorageError;

/// Convenience alias used across the workspace.
pub type MnemoResult<T> = Result<T, MnemoError>;

/// Top-level error for the engine.
#[derive(Debug, thiserror::Error)]
pub enum MnemoError {
    #[error("memory not found: {id}")]
    MemoryNotFound { id: i64 },

    #[error("{component} used before a store was attached")]
    NotInitialized { component: &'static str },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Causal(#[from] CausalError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl MnemoError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
