//! Edge management facade over the causal_edges table.

use std::sync::Arc;

use mnemo_core::errors::MnemoResult;
use mnemo_core::models::{CausalEdge, CausalRelation};
use mnemo_storage::queries::causal_ops::{self, GraphStats};
use mnemo_storage::MemoryStore;

use crate::traversal::{self, CausalChain, ChainOptions};

/// The causal graph bound to one store.
pub struct CausalGraph {
    store: Arc<MemoryStore>,
}

impl CausalGraph {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Insert one validated edge and return its id.
    pub async fn add_edge(&self, edge: &CausalEdge) -> MnemoResult<i64> {
        self.store
            .with_conn(|conn| causal_ops::insert_edge(conn, edge))
            .await
    }

    /// Insert a batch in one transaction; bad rows are reported in
    /// their slot without aborting the rest.
    pub async fn add_edges_batch(
        &self,
        edges: &[CausalEdge],
    ) -> MnemoResult<Vec<Result<i64, String>>> {
        self.store
            .with_conn(|conn| causal_ops::insert_edges_batch(conn, edges))
            .await
    }

    pub async fn get_edges_from(
        &self,
        source_id: &str,
        relation: Option<CausalRelation>,
        limit: Option<usize>,
    ) -> MnemoResult<Vec<CausalEdge>> {
        self.store
            .with_conn(|conn| causal_ops::get_edges_from(conn, source_id, relation, limit))
            .await
    }

    pub async fn get_edges_to(
        &self,
        target_id: &str,
        relation: Option<CausalRelation>,
        limit: Option<usize>,
    ) -> MnemoResult<Vec<CausalEdge>> {
        self.store
            .with_conn(|conn| causal_ops::get_edges_to(conn, target_id, relation, limit))
            .await
    }

    pub async fn get_all_edges(&self, memory_id: &str) -> MnemoResult<Vec<CausalEdge>> {
        self.store
            .with_conn(|conn| causal_ops::get_all_edges(conn, memory_id))
            .await
    }

    /// Strength and/or evidence are the only mutable edge fields.
    pub async fn update_edge(
        &self,
        id: i64,
        strength: Option<f64>,
        evidence: Option<&str>,
    ) -> MnemoResult<()> {
        self.store
            .with_conn(|conn| causal_ops::update_edge(conn, id, strength, evidence))
            .await
    }

    pub async fn delete_edge(&self, id: i64) -> MnemoResult<bool> {
        self.store
            .with_conn(|conn| causal_ops::delete_edge(conn, id))
            .await
    }

    /// Remove every edge a memory participates in (memory-deletion path).
    pub async fn delete_edges_for_memory(&self, memory_id: &str) -> MnemoResult<usize> {
        self.store
            .with_conn(|conn| causal_ops::delete_edges_for_memory(conn, memory_id))
            .await
    }

    /// Depth-limited, cycle-safe traversal answering "why" queries.
    pub async fn get_causal_chain(
        &self,
        start: &str,
        options: ChainOptions,
    ) -> MnemoResult<CausalChain> {
        let start = start.to_string();
        self.store
            .with_conn(move |conn| traversal::chain_query(conn, &start, &options))
            .await
    }

    pub async fn graph_stats(&self) -> MnemoResult<GraphStats> {
        self.store.with_conn(causal_ops::graph_stats).await
    }

    /// Edges whose endpoints no longer resolve to indexed memories.
    pub async fn find_orphaned_edges(&self) -> MnemoResult<Vec<CausalEdge>> {
        self.store.with_conn(causal_ops::find_orphaned_edges).await
    }
}
