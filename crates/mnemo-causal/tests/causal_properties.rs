//! Property tests: traversal terminates, visits nothing twice, and
//! honors invariants on arbitrary graphs.

use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;

use mnemo_core::models::{CausalEdge, CausalRelation, TraversalDirection};
use mnemo_core::traits::EmbeddingInfo;
use mnemo_causal::traversal::{chain_query, ChainOptions};
use mnemo_storage::queries::causal_ops;
use mnemo_storage::MemoryStore;

fn relation_for(index: usize) -> CausalRelation {
    CausalRelation::ALL[index % CausalRelation::ALL.len()]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// On any random graph (cycles included), traversal yields each
    /// edge at most once and every yielded edge respects the clamped
    /// depth bound.
    #[test]
    fn traversal_is_cycle_safe_and_depth_bounded(
        edges in proptest::collection::vec((0u8..12, 0u8..12, 0usize..6), 0..40),
        max_depth in 0usize..20,
    ) {
        let store = Arc::new(
            MemoryStore::open_in_memory(&EmbeddingInfo::new(4, "stub")).unwrap(),
        );

        store
            .with_conn_sync(|conn| {
                for (source, target, relation) in &edges {
                    if source == target {
                        continue;
                    }
                    causal_ops::insert_edge(
                        conn,
                        &CausalEdge {
                            id: 0,
                            source_id: format!("m{source}"),
                            target_id: format!("m{target}"),
                            relation: relation_for(*relation),
                            strength: 0.5,
                            evidence: None,
                            extracted_at: Utc::now(),
                        },
                    )?;
                }
                Ok(())
            })
            .unwrap();

        let chain = store
            .with_conn_sync(|conn| {
                chain_query(
                    conn,
                    "m0",
                    &ChainOptions {
                        max_depth,
                        direction: TraversalDirection::Both,
                        relations: None,
                    },
                )
            })
            .unwrap();

        let clamped = max_depth.clamp(1, 10);
        let mut seen = std::collections::HashSet::new();
        for chain_edge in &chain.edges {
            prop_assert!(seen.insert(chain_edge.edge.id), "edge yielded twice");
            prop_assert!(chain_edge.depth >= 1 && chain_edge.depth <= clamped);
            prop_assert_eq!(chain_edge.path.first().map(String::as_str), Some("m0"));
            prop_assert_eq!(chain_edge.path.len(), chain_edge.depth + 1);
        }

        let grouped: usize = chain.by_relation.values().map(Vec::len).sum();
        prop_assert_eq!(grouped, chain.edges.len());
    }

    /// Inserted edges always satisfy the strength and endpoint
    /// invariants; invalid ones never reach the table.
    #[test]
    fn stored_edges_respect_invariants(
        source in 0u8..6,
        target in 0u8..6,
        strength in -0.5f64..1.5,
    ) {
        let store = MemoryStore::open_in_memory(&EmbeddingInfo::new(4, "stub")).unwrap();
        let edge = CausalEdge {
            id: 0,
            source_id: format!("m{source}"),
            target_id: format!("m{target}"),
            relation: CausalRelation::Caused,
            strength,
            evidence: None,
            extracted_at: Utc::now(),
        };

        let inserted = store.with_conn_sync(|conn| {
            Ok(causal_ops::insert_edge(conn, &edge).is_ok())
        }).unwrap();

        let should_insert = source != target && (0.0..=1.0).contains(&strength);
        prop_assert_eq!(inserted, should_insert);

        let stored = store
            .with_conn_sync(|conn| causal_ops::get_edges_from(conn, &format!("m{source}"), None, None))
            .unwrap();
        for edge in stored {
            prop_assert!(edge.source_id != edge.target_id);
            prop_assert!((0.0..=1.0).contains(&edge.strength));
        }
    }
}
