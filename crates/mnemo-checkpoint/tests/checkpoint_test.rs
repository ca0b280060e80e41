//! Checkpoint engine: create/list/get/delete, caps, restore semantics.

use std::sync::Arc;

use mnemo_checkpoint::{
    blob, CheckpointEngine, CreateOptions, EmbeddingEntry, RestoreOptions, Snapshot,
};
use mnemo_core::config::EngineConfig;
use mnemo_core::memory::{EmbeddingStatus, ImportanceTier, MemoryRecord};
use mnemo_core::models::WorkingMemoryRow;
use mnemo_core::traits::EmbeddingInfo;
use mnemo_storage::queries::{memory_crud, vector_ops, working_memory_ops};
use mnemo_storage::MemoryStore;

fn test_engine() -> (Arc<MemoryStore>, CheckpointEngine) {
    let store = Arc::new(MemoryStore::open_in_memory(&EmbeddingInfo::new(4, "stub")).unwrap());
    let engine = CheckpointEngine::new(Arc::clone(&store));
    (store, engine)
}

fn seed_memory(store: &MemoryStore, title: &str, folder: &str, path: Option<&str>) -> i64 {
    store
        .with_conn_sync(|conn| {
            memory_crud::insert_memory(
                conn,
                &MemoryRecord {
                    title: title.to_string(),
                    spec_folder: folder.to_string(),
                    file_path: path.map(str::to_string),
                    content_hash: path.map(|_| "h".to_string()),
                    file_mtime_ms: path.map(|_| 1_700_000_000_000),
                    ..MemoryRecord::default()
                },
            )
        })
        .unwrap()
}

fn seed_embedding(store: &MemoryStore, id: i64, embedding: &[f32]) {
    store
        .with_conn_sync(|conn| {
            vector_ops::store_embedding(conn, id, embedding, embedding.len())?;
            mnemo_storage::queries::refresh_ops::mark_indexed(conn, id, "stub")
        })
        .unwrap();
}

#[tokio::test]
async fn create_get_delete_roundtrip() {
    let (store, engine) = test_engine();
    let a = seed_memory(&store, "alpha", "/f", Some("/f/a.md"));
    seed_embedding(&store, a, &[0.1, 0.2, 0.3, 0.4]);

    let id = engine
        .create(
            "first-checkpoint",
            CreateOptions {
                metadata: Some(serde_json::json!({"reason": "test"})),
                ..CreateOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(id > 0);

    let data = engine.get("first-checkpoint").await.unwrap();
    assert!(!data.legacy);
    assert_eq!(data.snapshot.memories.len(), 1);
    assert_eq!(data.snapshot.embeddings.len(), 1);
    let metadata = data.snapshot.metadata.unwrap();
    assert_eq!(metadata.embedding_dimension, 4);
    assert_eq!(metadata.memory_count, 1);
    assert_eq!(data.descriptor.metadata.unwrap()["reason"], "test");

    // get touched last_used_at.
    let listed = engine.list(None, None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].last_used_at.is_some());

    assert!(engine.delete("first-checkpoint").await.unwrap());
    assert!(!engine.delete("first-checkpoint").await.unwrap());
    assert!(engine.get("first-checkpoint").await.is_err());

    // create -> delete -> create with the same name succeeds.
    engine
        .create("first-checkpoint", CreateOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn name_validation_boundaries() {
    let (_store, engine) = test_engine();

    let max_name = "a".repeat(100);
    engine.create(&max_name, CreateOptions::default()).await.unwrap();

    let too_long = "a".repeat(101);
    assert!(engine.create(&too_long, CreateOptions::default()).await.is_err());
    assert!(engine.create("", CreateOptions::default()).await.is_err());
    assert!(engine.create("bad name", CreateOptions::default()).await.is_err());
    assert!(engine.create("bad/slash", CreateOptions::default()).await.is_err());
    engine.create("ok_name-123", CreateOptions::default()).await.unwrap();
}

#[tokio::test]
async fn duplicate_name_rejected() {
    let (_store, engine) = test_engine();
    engine.create("twice", CreateOptions::default()).await.unwrap();
    let err = engine.create("twice", CreateOptions::default()).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn cap_prunes_oldest_in_scope() {
    let (_store, engine) = test_engine();
    for i in 0..13 {
        engine
            .create(&format!("cp-{i:02}"), CreateOptions::default())
            .await
            .unwrap();
    }

    let listed = engine.list(None, Some(100)).await.unwrap();
    assert_eq!(listed.len(), 10);
    // The newest survive.
    assert!(listed.iter().any(|d| d.name == "cp-12"));
    assert!(!listed.iter().any(|d| d.name == "cp-00"));
}

#[tokio::test]
async fn snapshot_size_cap_enforced() {
    let (store, engine) = test_engine();
    drop(engine);
    seed_memory(&store, "big", "/f", None);

    let tight = CheckpointEngine::with_config(
        Arc::clone(&store),
        EngineConfig {
            max_snapshot_bytes: 16,
            ..EngineConfig::default()
        },
    );
    let err = tight.create("toobig", CreateOptions::default()).await.unwrap_err();
    assert!(err.to_string().contains("cap"));

    // Nothing was written.
    assert!(tight.list(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn corrupt_blobs_report_distinct_stages() {
    let (store, engine) = test_engine();
    store
        .with_conn_sync(|conn| {
            conn.execute(
                "INSERT INTO checkpoints (name, snapshot) VALUES ('mangled', ?1)",
                rusqlite::params![b"not gzip at all".to_vec()],
            )
            .map_err(|e| mnemo_core::MnemoError::validation(e.to_string()))?;
            Ok(())
        })
        .unwrap();

    let err = engine.get("mangled").await.unwrap_err();
    assert!(err.to_string().contains("decompress"));
    // One corrupt checkpoint does not poison the engine.
    engine.create("healthy", CreateOptions::default()).await.unwrap();
    engine.get("healthy").await.unwrap();
}

#[tokio::test]
async fn legacy_bare_array_snapshot_restores() {
    let (store, engine) = test_engine();
    let memories = vec![MemoryRecord::titled("from-legacy")];
    let json = serde_json::to_vec(&memories).unwrap();
    let blob_bytes = {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).unwrap();
        encoder.finish().unwrap()
    };
    store
        .with_conn_sync(|conn| {
            conn.execute(
                "INSERT INTO checkpoints (name, snapshot) VALUES ('legacy', ?1)",
                rusqlite::params![blob_bytes],
            )
            .map_err(|e| mnemo_core::MnemoError::validation(e.to_string()))?;
            Ok(())
        })
        .unwrap();

    let data = engine.get("legacy").await.unwrap();
    assert!(data.legacy);

    let report = engine.restore("legacy", RestoreOptions::default()).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.embeddings_in_snapshot, 0);
}

#[tokio::test]
async fn restore_with_clear_makes_scope_equal_snapshot() {
    let (store, engine) = test_engine();
    seed_memory(&store, "keep-1", "/f", Some("/f/1.md"));
    seed_memory(&store, "keep-2", "/f", Some("/f/2.md"));
    seed_memory(&store, "other-folder", "/g", Some("/g/1.md"));

    engine
        .create(
            "scoped",
            CreateOptions {
                spec_folder: Some("/f".to_string()),
                ..CreateOptions::default()
            },
        )
        .await
        .unwrap();

    // Scope drifts after the snapshot.
    seed_memory(&store, "straggler", "/f", Some("/f/3.md"));

    let report = engine
        .restore(
            "scoped",
            RestoreOptions {
                clear_existing: true,
                ..RestoreOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.cleared, 3);
    assert_eq!(report.inserted, 2);
    let titles: Vec<String> = store
        .with_conn_sync(|conn| {
            Ok(memory_crud::list_memories(conn, Some("/f"))?
                .into_iter()
                .map(|m| m.title)
                .collect())
        })
        .unwrap();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"keep-1".to_string()));
    assert!(titles.contains(&"keep-2".to_string()));
    assert!(!titles.contains(&"straggler".to_string()));

    // The unscoped folder was untouched.
    let other = store
        .with_conn_sync(|conn| memory_crud::list_memories(conn, Some("/g")))
        .unwrap();
    assert_eq!(other.len(), 1);
}

#[tokio::test]
async fn scoped_restore_without_clear_soft_deprecates() {
    let (store, engine) = test_engine();
    let id = seed_memory(&store, "old", "/f", Some("/f/old.md"));

    engine
        .create(
            "soft",
            CreateOptions {
                spec_folder: Some("/f".to_string()),
                ..CreateOptions::default()
            },
        )
        .await
        .unwrap();

    let report = engine
        .restore("soft", RestoreOptions::default())
        .await
        .unwrap();

    // The pre-existing row was soft-cleared, then re-adopted by the
    // UPSERT under its (file_path, spec_folder) identity.
    assert_eq!(report.deprecated, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 0);
    let memory = store
        .with_conn_sync(|conn| Ok(memory_crud::get_memory(conn, id)?.unwrap()))
        .unwrap();
    assert_eq!(memory.importance_tier, ImportanceTier::Normal);
}

#[tokio::test]
async fn restore_dimension_mismatch_marks_pending() {
    // Store runs at dimension 4; snapshot vectors are 8-wide.
    let (store, engine) = test_engine();
    let snapshot = Snapshot {
        memories: vec![
            MemoryRecord {
                id: 101,
                title: "one".into(),
                ..MemoryRecord::default()
            },
            MemoryRecord {
                id: 102,
                title: "two".into(),
                ..MemoryRecord::default()
            },
            MemoryRecord {
                id: 103,
                title: "three".into(),
                ..MemoryRecord::default()
            },
        ],
        embeddings: (101..=103)
            .map(|id| EmbeddingEntry {
                memory_id: id,
                embedding: vec![0.5; 8],
            })
            .collect(),
        working_memory: Vec::new(),
        metadata: None,
    };
    let (blob_bytes, _) = blob::encode(&snapshot).unwrap();
    store
        .with_conn_sync(|conn| {
            conn.execute(
                "INSERT INTO checkpoints (name, snapshot) VALUES ('mismatch', ?1)",
                rusqlite::params![blob_bytes],
            )
            .map_err(|e| mnemo_core::MnemoError::validation(e.to_string()))?;
            Ok(())
        })
        .unwrap();

    let report = engine
        .restore("mismatch", RestoreOptions::default())
        .await
        .unwrap();

    assert_eq!(report.inserted, 3);
    assert_eq!(report.embeddings_in_snapshot, 3);
    assert_eq!(report.embeddings_restored, 0);
    assert_eq!(report.embeddings_skipped, 3);
    assert!(report.note.contains("reindex"));

    let memories = store
        .with_conn_sync(|conn| memory_crud::list_memories(conn, Some("")))
        .unwrap();
    assert_eq!(memories.len(), 3);
    for memory in memories {
        assert_eq!(memory.embedding_status, EmbeddingStatus::Pending);
    }
}

#[tokio::test]
async fn restore_rehydrates_matching_embeddings() {
    let (store, engine) = test_engine();
    let id = seed_memory(&store, "vec", "/f", Some("/f/v.md"));
    seed_embedding(&store, id, &[0.9, 0.1, 0.0, 0.0]);

    engine.create("withvec", CreateOptions::default()).await.unwrap();

    let report = engine
        .restore(
            "withvec",
            RestoreOptions {
                clear_existing: true,
                ..RestoreOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.embeddings_restored, 1);
    assert_eq!(report.embeddings_skipped, 0);
    assert!(report.note.contains("immediately"));

    let restored = store
        .with_conn_sync(|conn| {
            let memories = memory_crud::list_memories(conn, None)?;
            let memory = &memories[0];
            assert_eq!(memory.embedding_status, EmbeddingStatus::Success);
            vector_ops::get_embedding(conn, memory.id, 4)
        })
        .unwrap()
        .unwrap();
    assert_eq!(restored, vec![0.9, 0.1, 0.0, 0.0]);
}

#[tokio::test]
async fn working_memory_restores_with_remapped_ids() {
    let (store, engine) = test_engine();
    let id = seed_memory(&store, "wm-target", "/f", None);
    store
        .with_conn_sync(|conn| {
            working_memory_ops::upsert(
                conn,
                &WorkingMemoryRow {
                    session_id: "session-1".to_string(),
                    memory_id: id,
                    attention_score: 0.8,
                    last_mentioned_turn: 7,
                    ..WorkingMemoryRow::default()
                },
            )
        })
        .unwrap();

    engine
        .create(
            "with-wm",
            CreateOptions {
                include_working_memory: true,
                ..CreateOptions::default()
            },
        )
        .await
        .unwrap();

    let report = engine
        .restore(
            "with-wm",
            RestoreOptions {
                clear_existing: true,
                include_working_memory: true,
                ..RestoreOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.working_memory_restored, 1);
    let rows = store
        .with_conn_sync(|conn| working_memory_ops::get_session(conn, "session-1"))
        .unwrap();
    assert_eq!(rows.len(), 1);
    // The overlay row follows the memory's new identity.
    let memories = store
        .with_conn_sync(|conn| memory_crud::list_memories(conn, None))
        .unwrap();
    assert_eq!(rows[0].memory_id, memories[0].id);
    assert!((rows[0].attention_score - 0.8).abs() < 1e-9);
    assert_eq!(rows[0].last_mentioned_turn, 7);
}

#[tokio::test]
async fn working_memory_rows_without_mapped_memory_are_skipped() {
    let (store, engine) = test_engine();
    let snapshot = Snapshot {
        memories: vec![MemoryRecord {
            id: 7,
            title: "mapped".into(),
            ..MemoryRecord::default()
        }],
        embeddings: Vec::new(),
        working_memory: vec![
            WorkingMemoryRow {
                session_id: "s".to_string(),
                memory_id: 7,
                attention_score: 0.5,
                ..WorkingMemoryRow::default()
            },
            // Points at a memory the snapshot does not carry.
            WorkingMemoryRow {
                session_id: "s".to_string(),
                memory_id: 999,
                attention_score: 0.4,
                ..WorkingMemoryRow::default()
            },
        ],
        metadata: None,
    };
    let (blob_bytes, _) = blob::encode(&snapshot).unwrap();
    store
        .with_conn_sync(|conn| {
            conn.execute(
                "INSERT INTO checkpoints (name, snapshot) VALUES ('orphan-wm', ?1)",
                rusqlite::params![blob_bytes],
            )
            .map_err(|e| mnemo_core::MnemoError::validation(e.to_string()))?;
            Ok(())
        })
        .unwrap();

    let report = engine
        .restore(
            "orphan-wm",
            RestoreOptions {
                include_working_memory: true,
                ..RestoreOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.working_memory_restored, 1);
    let rows = store
        .with_conn_sync(|conn| working_memory_ops::get_session(conn, "s"))
        .unwrap();
    assert_eq!(rows.len(), 1);
}
