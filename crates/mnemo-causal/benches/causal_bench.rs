//! Traversal benchmark over a branching graph.

use std::sync::Arc;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};

use mnemo_core::models::{CausalEdge, CausalRelation, TraversalDirection};
use mnemo_core::traits::EmbeddingInfo;
use mnemo_causal::traversal::{chain_query, ChainOptions};
use mnemo_storage::queries::causal_ops;
use mnemo_storage::MemoryStore;

fn build_store(fanout: usize, depth: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::open_in_memory(&EmbeddingInfo::new(4, "bench")).unwrap());
    store
        .with_conn_sync(|conn| {
            let mut frontier = vec!["root".to_string()];
            let mut counter = 0usize;
            for _ in 0..depth {
                let mut next = Vec::new();
                for node in &frontier {
                    for _ in 0..fanout {
                        let child = format!("n{counter}");
                        counter += 1;
                        causal_ops::insert_edge(
                            conn,
                            &CausalEdge {
                                id: 0,
                                source_id: node.clone(),
                                target_id: child.clone(),
                                relation: CausalRelation::Caused,
                                strength: 0.8,
                                evidence: None,
                                extracted_at: Utc::now(),
                            },
                        )?;
                        next.push(child);
                    }
                }
                frontier = next;
            }
            Ok(())
        })
        .unwrap();
    store
}

fn bench_causal_chain(c: &mut Criterion) {
    let store = build_store(3, 5);
    c.bench_function("causal_chain_depth5_fanout3", |b| {
        b.iter(|| {
            store
                .with_conn_sync(|conn| {
                    chain_query(
                        conn,
                        "root",
                        &ChainOptions {
                            max_depth: 5,
                            direction: TraversalDirection::Outgoing,
                            relations: None,
                        },
                    )
                })
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_causal_chain);
criterion_main!(benches);
