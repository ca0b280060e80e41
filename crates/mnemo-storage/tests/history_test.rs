//! History recording, querying, and one-step undo.

use serde_json::json;

use mnemo_core::memory::{ImportanceTier, MemoryRecord};
use mnemo_core::models::{HistoryActor, HistoryEvent};
use mnemo_core::traits::EmbeddingInfo;
use mnemo_storage::queries::{history_ops, memory_crud};
use mnemo_storage::{undo, MemoryStore};

fn test_store() -> MemoryStore {
    MemoryStore::open_in_memory(&EmbeddingInfo::new(4, "stub-model")).unwrap()
}

fn insert_titled(store: &MemoryStore, title: &str, weight: f64) -> i64 {
    store
        .with_conn_sync(|conn| {
            memory_crud::insert_memory(
                conn,
                &MemoryRecord {
                    title: title.to_string(),
                    importance_weight: weight,
                    spec_folder: "/specs/001".to_string(),
                    ..MemoryRecord::default()
                },
            )
        })
        .unwrap()
}

#[test]
fn event_field_requirements_enforced() {
    let store = test_store();
    store
        .with_conn_sync(|conn| {
            let id = memory_crud::insert_memory(conn, &MemoryRecord::titled("m"))?;

            // ADD without new_value is rejected, nothing is written.
            assert!(history_ops::record_history(
                conn,
                id,
                HistoryEvent::Add,
                HistoryActor::System,
                None,
                None,
            )
            .is_err());
            assert!(history_ops::get_history(conn, id, None, None)?.is_empty());

            // DELETE requires prev, UPDATE requires both.
            assert!(history_ops::record_history(
                conn,
                id,
                HistoryEvent::Delete,
                HistoryActor::User,
                None,
                Some(&json!({})),
            )
            .is_err());
            assert!(history_ops::record_history(
                conn,
                id,
                HistoryEvent::Update,
                HistoryActor::User,
                Some(&json!({})),
                None,
            )
            .is_err());
            Ok(())
        })
        .unwrap();
}

#[test]
fn history_query_ordering_and_filters() {
    let store = test_store();
    store
        .with_conn_sync(|conn| {
            let id = memory_crud::insert_memory(conn, &MemoryRecord::titled("m"))?;
            history_ops::record_history(
                conn,
                id,
                HistoryEvent::Add,
                HistoryActor::Hook,
                None,
                Some(&json!({"title": "v1"})),
            )?;
            history_ops::record_history(
                conn,
                id,
                HistoryEvent::Update,
                HistoryActor::User,
                Some(&json!({"title": "v1"})),
                Some(&json!({"title": "v2"})),
            )?;

            let ascending = history_ops::get_history(conn, id, None, None)?;
            assert_eq!(ascending.len(), 2);
            assert_eq!(ascending[0].event, HistoryEvent::Add);
            assert_eq!(ascending[1].event, HistoryEvent::Update);

            let recent = history_ops::get_recent_history(conn, 10, None, None)?;
            assert_eq!(recent[0].event, HistoryEvent::Update);

            let only_adds =
                history_ops::get_recent_history(conn, 10, Some(HistoryEvent::Add), None)?;
            assert_eq!(only_adds.len(), 1);
            let only_hook =
                history_ops::get_recent_history(conn, 10, None, Some(HistoryActor::Hook))?;
            assert_eq!(only_hook.len(), 1);
            assert_eq!(only_hook[0].actor, HistoryActor::Hook);
            Ok(())
        })
        .unwrap();
}

#[test]
fn malformed_payload_json_reads_as_null() {
    let store = test_store();
    store
        .with_conn_sync(|conn| {
            let id = memory_crud::insert_memory(conn, &MemoryRecord::titled("m"))?;
            conn.execute(
                "INSERT INTO memory_history (id, memory_id, event, actor, timestamp, prev_value, new_value)
                 VALUES ('broken-row', ?1, 'UPDATE', 'system',
                         strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), '{not json', '{\"title\": \"ok\"}')",
                rusqlite::params![id],
            )
            .map_err(|e| mnemo_core::MnemoError::validation(e.to_string()))?;

            let entries = history_ops::get_history(conn, id, None, None)?;
            assert_eq!(entries.len(), 1);
            assert!(entries[0].prev_value.is_none());
            assert_eq!(entries[0].new_value.as_ref().unwrap()["title"], "ok");
            Ok(())
        })
        .unwrap();
}

#[test]
fn undo_update_restores_previous_fields() {
    let store = test_store();
    let id = insert_titled(&store, "v2", 0.8);
    store
        .with_conn_sync(|conn| {
            history_ops::record_history(
                conn,
                id,
                HistoryEvent::Update,
                HistoryActor::User,
                Some(&json!({"title": "v1", "importance_weight": 0.6})),
                Some(&json!({"title": "v2", "importance_weight": 0.8})),
            )?;

            let result = undo::undo_last_change(conn, id)?;
            assert_eq!(result.undone_event, HistoryEvent::Update);

            let memory = memory_crud::get_memory(conn, id)?.unwrap();
            assert_eq!(memory.title, "v1");
            assert!((memory.importance_weight - 0.6).abs() < 1e-9);

            // The compensating event inverts the original.
            let latest = history_ops::latest_event(conn, id)?.unwrap();
            assert_eq!(latest.event, HistoryEvent::Update);
            assert_eq!(latest.actor, HistoryActor::System);
            assert_eq!(latest.prev_value.as_ref().unwrap()["title"], "v2");
            assert_eq!(latest.new_value.as_ref().unwrap()["title"], "v1");
            Ok(())
        })
        .unwrap();
}

#[test]
fn undo_update_accepts_camel_case_payloads() {
    let store = test_store();
    let id = insert_titled(&store, "v2", 0.8);
    store
        .with_conn_sync(|conn| {
            history_ops::record_history(
                conn,
                id,
                HistoryEvent::Update,
                HistoryActor::User,
                Some(&json!({"title": "v1", "importanceWeight": 0.6})),
                Some(&json!({"title": "v2", "importanceWeight": 0.8})),
            )?;
            undo::undo_last_change(conn, id)?;
            let memory = memory_crud::get_memory(conn, id)?.unwrap();
            assert!((memory.importance_weight - 0.6).abs() < 1e-9);
            Ok(())
        })
        .unwrap();
}

#[test]
fn undo_add_then_undo_again_restores() {
    let store = test_store();
    let id = insert_titled(&store, "fresh", 0.5);
    store
        .with_conn_sync(|conn| {
            history_ops::record_history(
                conn,
                id,
                HistoryEvent::Add,
                HistoryActor::System,
                None,
                Some(&json!({"title": "fresh", "importance_weight": 0.5})),
            )?;

            // First undo soft-deletes.
            let first = undo::undo_last_change(conn, id)?;
            assert_eq!(first.undone_event, HistoryEvent::Add);
            let memory = memory_crud::get_memory(conn, id)?.unwrap();
            assert_eq!(memory.importance_tier, ImportanceTier::Deprecated);

            // Second undo inverts the compensating DELETE and restores.
            let second = undo::undo_last_change(conn, id)?;
            assert_eq!(second.undone_event, HistoryEvent::Delete);
            let memory = memory_crud::get_memory(conn, id)?.unwrap();
            assert_eq!(memory.title, "fresh");
            assert_eq!(memory.importance_tier, ImportanceTier::Normal);
            Ok(())
        })
        .unwrap();
}

#[test]
fn undo_delete_reinstates_hard_deleted_row() {
    let store = test_store();
    let id = insert_titled(&store, "gone", 0.4);
    store
        .with_conn_sync(|conn| {
            history_ops::record_history(
                conn,
                id,
                HistoryEvent::Delete,
                HistoryActor::User,
                Some(&json!({"title": "gone", "importance_weight": 0.4})),
                None,
            )?;
            // Simulate the hard delete that followed the event; history
            // for the id survives because we re-record it below.
            conn.execute("DELETE FROM memory_index WHERE id = ?1", rusqlite::params![id])
                .map_err(|e| mnemo_core::MnemoError::validation(e.to_string()))?;

            let result = undo::undo_last_change(conn, id)?;
            assert_eq!(result.undone_event, HistoryEvent::Delete);
            let memory = memory_crud::get_memory(conn, id)?.unwrap();
            assert_eq!(memory.id, id);
            assert_eq!(memory.title, "gone");
            assert_eq!(memory.importance_tier, ImportanceTier::Normal);
            Ok(())
        })
        .unwrap();
}

#[test]
fn undo_without_history_is_an_error() {
    let store = test_store();
    let id = insert_titled(&store, "quiet", 0.5);
    store
        .with_conn_sync(|conn| {
            assert!(undo::undo_last_change(conn, id).is_err());
            Ok(())
        })
        .unwrap();
}

#[test]
fn purge_removes_only_old_rows() {
    let store = test_store();
    store
        .with_conn_sync(|conn| {
            let id = memory_crud::insert_memory(conn, &MemoryRecord::titled("m"))?;
            history_ops::record_history(
                conn,
                id,
                HistoryEvent::Add,
                HistoryActor::System,
                None,
                Some(&json!({"title": "m"})),
            )?;
            // Back-date one row far past any retention window.
            conn.execute(
                "INSERT INTO memory_history (id, memory_id, event, actor, timestamp, prev_value, new_value)
                 VALUES ('ancient', ?1, 'ADD', 'system', '2001-01-01T00:00:00Z', NULL, '{}')",
                rusqlite::params![id],
            )
            .map_err(|e| mnemo_core::MnemoError::validation(e.to_string()))?;

            let purged = history_ops::purge_old_history(conn, 30)?;
            assert_eq!(purged, 1);
            let remaining = history_ops::get_history(conn, id, None, None)?;
            assert_eq!(remaining.len(), 1);
            Ok(())
        })
        .unwrap();
}
