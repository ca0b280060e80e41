//! Append-only history records with actor attribution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{MnemoError, MnemoResult};

/// What happened to a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryEvent {
    Add,
    Update,
    Delete,
}

impl HistoryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ADD" => Some(Self::Add),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Who caused the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryActor {
    User,
    System,
    Hook,
    Decay,
}

impl HistoryActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Hook => "hook",
            Self::Decay => "decay",
        }
    }

    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "user" => Self::User,
            "hook" => Self::Hook,
            "decay" => Self::Decay,
            _ => Self::System,
        }
    }
}

impl Default for HistoryActor {
    fn default() -> Self {
        Self::System
    }
}

/// One immutable row of `memory_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// UUID v4.
    pub id: String,
    pub memory_id: i64,
    pub event: HistoryEvent,
    pub actor: HistoryActor,
    pub timestamp: DateTime<Utc>,
    /// State before the event. `None` when the stored JSON was absent or
    /// unreadable; the read path never fails on a malformed payload.
    pub prev_value: Option<serde_json::Value>,
    /// State after the event.
    pub new_value: Option<serde_json::Value>,
}

impl HistoryEntry {
    /// Event-specific field requirements: ADD needs `new`, DELETE needs
    /// `prev`, UPDATE needs both.
    pub fn validate(&self) -> MnemoResult<()> {
        let (need_prev, need_new) = match self.event {
            HistoryEvent::Add => (false, true),
            HistoryEvent::Delete => (true, false),
            HistoryEvent::Update => (true, true),
        };
        if need_prev && self.prev_value.is_none() {
            return Err(MnemoError::validation(format!(
                "{} event requires prev_value",
                self.event.as_str()
            )));
        }
        if need_new && self.new_value.is_none() {
            return Err(MnemoError::validation(format!(
                "{} event requires new_value",
                self.event.as_str()
            )));
        }
        Ok(())
    }
}

/// The portion of a history payload the undo path acts on.
///
/// Payloads in the wild carry both `importance_weight` and
/// `importanceWeight` because older writers used camelCase. Both keys are
/// accepted; when the two disagree the snake_case value wins and the
/// conflict is logged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPayload {
    pub title: Option<String>,
    pub importance_weight: Option<f64>,
    pub importance_tier: Option<crate::memory::ImportanceTier>,
}

impl HistoryPayload {
    /// Extract the undo-relevant fields from a raw payload value.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let title = value
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let snake = value.get("importance_weight").and_then(|v| v.as_f64());
        let camel = value.get("importanceWeight").and_then(|v| v.as_f64());
        let importance_weight = match (snake, camel) {
            (Some(s), Some(c)) => {
                if (s - c).abs() > f64::EPSILON {
                    tracing::warn!(
                        snake_case = s,
                        camel_case = c,
                        "history payload carries conflicting importance weights; using snake_case"
                    );
                }
                Some(s)
            }
            (Some(s), None) => Some(s),
            (None, Some(c)) => Some(c),
            (None, None) => None,
        };

        let importance_tier = value
            .get("importance_tier")
            .or_else(|| value.get("importanceTier"))
            .and_then(|v| v.as_str())
            .map(crate::memory::ImportanceTier::parse_lossy);

        Self {
            title,
            importance_weight,
            importance_tier,
        }
    }
}
