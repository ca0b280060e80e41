//! # mnemo-core
//!
//! Foundation crate for the mnemo memory engine.
//! Defines all types, traits, errors, config, and constants.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod memory;
pub mod models;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::EngineConfig;
pub use errors::{MnemoError, MnemoResult};
pub use memory::{EmbeddingStatus, ImportanceTier, MemoryRecord};
pub use models::{CausalEdge, CausalRelation, HistoryActor, HistoryEntry, HistoryEvent};
pub use traits::{EmbeddingInfo, EmbeddingProvider};
