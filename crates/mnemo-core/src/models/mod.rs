//! Shared model types that cross crate boundaries.

mod causal;
mod checkpoint;
mod history;
mod working_memory;

pub use causal::{CausalEdge, CausalRelation, TraversalDirection};
pub use checkpoint::{CheckpointDescriptor, RestoreReport};
pub use history::{HistoryActor, HistoryEntry, HistoryEvent, HistoryPayload};
pub use working_memory::WorkingMemoryRow;
