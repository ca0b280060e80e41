//! One-step undo by replaying the inverse of the most recent history
//! event. All effects of one undo commit together or not at all.

use rusqlite::Connection;
use serde_json::json;

use mnemo_core::errors::MnemoResult;
use mnemo_core::memory::{ImportanceTier, MemoryRecord};
use mnemo_core::models::{HistoryActor, HistoryEvent, HistoryPayload};
use mnemo_core::MnemoError;

use crate::queries::{history_ops, memory_crud};
use crate::to_storage_err;

/// Outcome of an undo: the compensating event id and the memory state
/// after the inverse was applied (absent if the undo soft-deleted it).
#[derive(Debug, Clone)]
pub struct UndoResult {
    pub compensating_event_id: String,
    pub undone_event: HistoryEvent,
    pub restored: Option<MemoryRecord>,
}

/// Undo the most recent recorded change to a memory.
///
/// ADD is inverted by a soft delete (tier -> deprecated), UPDATE by
/// restoring the previous title and importance weight, DELETE by
/// reinstating the recorded state. Each inverse records its own
/// compensating event so a second undo re-inverts the first.
pub fn undo_last_change(conn: &Connection, memory_id: i64) -> MnemoResult<UndoResult> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("undo begin: {e}")))?;

    match undo_inner(&tx, memory_id) {
        Ok(result) => {
            tx.commit()
                .map_err(|e| to_storage_err(format!("undo commit: {e}")))?;
            Ok(result)
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn undo_inner(conn: &Connection, memory_id: i64) -> MnemoResult<UndoResult> {
    let entry = history_ops::latest_event(conn, memory_id)?.ok_or_else(|| {
        MnemoError::validation(format!("no history recorded for memory {memory_id}"))
    })?;

    let compensating_event_id = match entry.event {
        HistoryEvent::Add => {
            // Inverse of ADD: soft delete, recorded as a DELETE holding
            // the state that is being retired.
            memory_crud::deprecate_memory(conn, memory_id)?;
            history_ops::record_history(
                conn,
                memory_id,
                HistoryEvent::Delete,
                HistoryActor::System,
                entry.new_value.as_ref(),
                None,
            )?
        }
        HistoryEvent::Update => {
            let prev = entry.prev_value.as_ref().ok_or_else(|| {
                MnemoError::validation("UPDATE history entry is missing prev_value")
            })?;
            let payload = HistoryPayload::from_value(prev);

            let current = memory_crud::get_memory(conn, memory_id)?
                .ok_or(MnemoError::MemoryNotFound { id: memory_id })?;
            let before = json!({
                "title": current.title.clone(),
                "importance_weight": current.importance_weight,
            });

            memory_crud::update_undo_fields(
                conn,
                memory_id,
                payload.title.as_deref(),
                payload.importance_weight,
                payload.importance_tier,
            )?;

            let after = json!({
                "title": payload.title.unwrap_or(current.title),
                "importance_weight": payload.importance_weight.unwrap_or(current.importance_weight),
            });
            history_ops::record_history(
                conn,
                memory_id,
                HistoryEvent::Update,
                HistoryActor::System,
                Some(&before),
                Some(&after),
            )?
        }
        HistoryEvent::Delete => {
            let prev = entry.prev_value.as_ref().ok_or_else(|| {
                MnemoError::validation("DELETE history entry is missing prev_value")
            })?;
            let payload = HistoryPayload::from_value(prev);
            let tier = payload.importance_tier.unwrap_or(ImportanceTier::Normal);

            let updated = memory_crud::update_undo_fields(
                conn,
                memory_id,
                payload.title.as_deref(),
                payload.importance_weight,
                Some(tier),
            )?;
            if updated == 0 {
                // The row was hard-deleted; rebuild it from the payload.
                let mut record: MemoryRecord =
                    serde_json::from_value(prev.clone()).unwrap_or_default();
                record.id = memory_id;
                record.importance_tier = tier;
                memory_crud::insert_memory_with_id(conn, &record)?;
            }

            let restored_state = json!({
                "title": payload.title,
                "importance_weight": payload.importance_weight,
                "importance_tier": tier.as_str(),
            });
            history_ops::record_history(
                conn,
                memory_id,
                HistoryEvent::Update,
                HistoryActor::System,
                Some(prev),
                Some(&restored_state),
            )?
        }
    };

    let restored = memory_crud::get_memory(conn, memory_id)?;
    Ok(UndoResult {
        compensating_event_id,
        undone_event: entry.event,
        restored,
    })
}
