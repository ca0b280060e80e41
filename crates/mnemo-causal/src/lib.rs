//! # mnemo-causal
//!
//! The typed causal graph over memories: validated edge management,
//! depth-limited cycle-safe traversal grouped by relation, graph-level
//! statistics, and orphan detection.

pub mod graph;
pub mod traversal;

pub use graph::CausalGraph;
pub use traversal::{CausalChain, ChainEdge, ChainOptions};
