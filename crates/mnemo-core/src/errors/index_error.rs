/// Errors raised by the incremental indexer and the atomic save path.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O failure on {path}: {message}")]
    Io { path: String, message: String },

    #[error("short write on {path}: wrote {actual} of {expected} bytes")]
    ShortWrite {
        path: String,
        expected: u64,
        actual: u64,
    },
}
