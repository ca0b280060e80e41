//! The canonical memory record and its enumerated attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Qualitative retention class. Controls decay and pruning eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceTier {
    Constitutional,
    Critical,
    Important,
    Normal,
    Temporary,
    Deprecated,
}

impl ImportanceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constitutional => "constitutional",
            Self::Critical => "critical",
            Self::Important => "important",
            Self::Normal => "normal",
            Self::Temporary => "temporary",
            Self::Deprecated => "deprecated",
        }
    }

    /// Parse from a stored column value. Unknown values map to `Normal`
    /// so that old rows never poison the read path.
    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "constitutional" => Self::Constitutional,
            "critical" => Self::Critical,
            "important" => Self::Important,
            "temporary" => Self::Temporary,
            "deprecated" => Self::Deprecated,
            _ => Self::Normal,
        }
    }
}

impl Default for ImportanceTier {
    fn default() -> Self {
        Self::Normal
    }
}

impl std::fmt::Display for ImportanceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding lifecycle state.
///
/// Legal transitions: `pending -> retry -> success | failed`. A row only
/// reaches `failed` after the retry budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    Pending,
    Retry,
    Success,
    Failed,
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retry => "retry",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "retry" => Self::Retry,
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl Default for EmbeddingStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for EmbeddingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `memory_index`, the canonical unit the engine stores.
///
/// Serialized with camelCase keys on the checkpoint wire; snake_case
/// aliases keep older snapshots readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryRecord {
    pub id: i64,
    /// On-disk location. Unique per spec folder when present; file-less
    /// memories carry `None`.
    #[serde(alias = "file_path")]
    pub file_path: Option<String>,
    /// SHA-256 over the file's UTF-8 bytes. Set together with
    /// `file_mtime_ms` or not at all.
    #[serde(alias = "content_hash")]
    pub content_hash: Option<String>,
    #[serde(alias = "file_mtime_ms")]
    pub file_mtime_ms: Option<i64>,
    pub title: String,
    #[serde(alias = "anchor_id")]
    pub anchor_id: String,
    #[serde(alias = "trigger_phrases")]
    pub trigger_phrases: Vec<String>,
    #[serde(alias = "importance_weight")]
    pub importance_weight: f64,
    #[serde(alias = "importance_tier")]
    pub importance_tier: ImportanceTier,
    #[serde(alias = "embedding_model")]
    pub embedding_model: Option<String>,
    #[serde(alias = "embedding_status")]
    pub embedding_status: EmbeddingStatus,
    #[serde(alias = "retry_count")]
    pub retry_count: i64,
    #[serde(alias = "last_retry_at")]
    pub last_retry_at: Option<DateTime<Utc>>,
    #[serde(alias = "failure_reason")]
    pub failure_reason: Option<String>,
    #[serde(alias = "embedding_generated_at")]
    pub embedding_generated_at: Option<DateTime<Utc>>,
    #[serde(alias = "context_type")]
    pub context_type: Option<String>,
    pub channel: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updated_at")]
    pub updated_at: DateTime<Utc>,
    #[serde(alias = "access_count")]
    pub access_count: i64,
    #[serde(alias = "last_accessed")]
    pub last_accessed: Option<DateTime<Utc>>,
    /// Grouping key; scopes checkpoints and folder-level queries.
    #[serde(alias = "spec_folder")]
    pub spec_folder: String,
}

impl Default for MemoryRecord {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            file_path: None,
            content_hash: None,
            file_mtime_ms: None,
            title: String::new(),
            anchor_id: String::new(),
            trigger_phrases: Vec::new(),
            importance_weight: 0.5,
            importance_tier: ImportanceTier::Normal,
            embedding_model: None,
            embedding_status: EmbeddingStatus::Pending,
            retry_count: 0,
            last_retry_at: None,
            failure_reason: None,
            embedding_generated_at: None,
            context_type: None,
            channel: None,
            created_at: now,
            updated_at: now,
            access_count: 0,
            last_accessed: None,
            spec_folder: String::new(),
        }
    }
}

impl MemoryRecord {
    /// A minimally valid record with the given title, for callers that
    /// fill in the rest field-by-field.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_roundtrip() {
        for tier in [
            ImportanceTier::Constitutional,
            ImportanceTier::Critical,
            ImportanceTier::Important,
            ImportanceTier::Normal,
            ImportanceTier::Temporary,
            ImportanceTier::Deprecated,
        ] {
            assert_eq!(ImportanceTier::parse_lossy(tier.as_str()), tier);
        }
        assert_eq!(ImportanceTier::parse_lossy("garbage"), ImportanceTier::Normal);
    }

    #[test]
    fn snake_case_snapshot_keys_accepted() {
        let json = r#"{
            "id": 7,
            "file_path": "/specs/001/spec.md",
            "title": "t",
            "anchor_id": "a",
            "importance_weight": 0.4,
            "importance_tier": "critical",
            "embedding_status": "success",
            "spec_folder": "/specs/001"
        }"#;
        let record: MemoryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.file_path.as_deref(), Some("/specs/001/spec.md"));
        assert_eq!(record.importance_tier, ImportanceTier::Critical);
        assert_eq!(record.embedding_status, EmbeddingStatus::Success);
    }
}
