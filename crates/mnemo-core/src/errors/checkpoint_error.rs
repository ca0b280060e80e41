/// Errors raised by the checkpoint engine.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("invalid checkpoint name: {name:?} (expected [A-Za-z0-9_-]{{1,100}})")]
    InvalidName { name: String },

    #[error("checkpoint already exists: {name}")]
    NameCollision { name: String },

    #[error("checkpoint not found: {name}")]
    NotFound { name: String },

    #[error("snapshot is {bytes} bytes uncompressed, over the {max}-byte cap")]
    SizeLimitExceeded { bytes: usize, max: usize },

    #[error("corrupt checkpoint blob for {name} during {stage}: {reason}")]
    CorruptBlob {
        name: String,
        /// Which codec step failed: `decompress` or `parse` on the read
        /// path, `serialize` or `compress` on the write path. Each stage
        /// is reported distinctly.
        stage: &'static str,
        reason: String,
    },
}
