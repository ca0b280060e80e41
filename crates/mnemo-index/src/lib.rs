//! # mnemo-index
//!
//! File-side concerns of the memory engine: the incremental indexer
//! (reindex / skip / mtime-refresh decisions) and the atomic
//! file-write-plus-index transaction with pending-file recovery.

pub mod atomic;
pub mod hash;
pub mod indexer;
pub mod pending;
pub mod recovery;

pub use atomic::{SaveOptions, SaveOutcome, SaveRequest, TransactionManager};
pub use indexer::{CategorizeReport, DecisionReason, IndexerOptions, ReindexDecision};
pub use recovery::{recover_all_pending, RecoveryOptions, RecoveryReport};
