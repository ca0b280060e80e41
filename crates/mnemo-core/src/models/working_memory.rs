//! Session-scoped transient attention overlay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::ImportanceTier;

/// One row of `working_memory`. Backed up optionally by checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkingMemoryRow {
    #[serde(alias = "session_id")]
    pub session_id: String,
    #[serde(alias = "memory_id")]
    pub memory_id: i64,
    #[serde(alias = "attention_score")]
    pub attention_score: f64,
    #[serde(alias = "last_mentioned_turn")]
    pub last_mentioned_turn: i64,
    pub tier: ImportanceTier,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl Default for WorkingMemoryRow {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            session_id: String::new(),
            memory_id: 0,
            attention_score: 0.0,
            last_mentioned_turn: 0,
            tier: ImportanceTier::Normal,
            created_at: now,
            updated_at: now,
        }
    }
}
