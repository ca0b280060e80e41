//! The embedding provider seam.
//!
//! The engine treats embedding as a pure function `text -> vector` owned
//! by the caller. Dimension and model name must be stable within a
//! process run; a change between runs is detected at startup and queues
//! affected rows for regeneration.

use crate::errors::MnemoResult;

/// External embedding provider.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text into a fixed-dimension vector.
    fn embed(&self, text: &str) -> MnemoResult<Vec<f32>>;

    /// The dimension every vector from this provider has.
    fn dimension(&self) -> usize;

    /// Stable model identifier, recorded on each indexed row.
    fn model_name(&self) -> &str;
}

/// The two provider facts the store needs at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingInfo {
    pub dimension: usize,
    pub model_name: String,
}

impl EmbeddingInfo {
    pub fn new(dimension: usize, model_name: impl Into<String>) -> Self {
        Self {
            dimension,
            model_name: model_name.into(),
        }
    }

    pub fn of(provider: &dyn EmbeddingProvider) -> Self {
        Self {
            dimension: provider.dimension(),
            model_name: provider.model_name().to_string(),
        }
    }
}
