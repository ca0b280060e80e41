//! Trait seams consumed by the engine.

mod embedding;

pub use embedding::{EmbeddingInfo, EmbeddingProvider};
