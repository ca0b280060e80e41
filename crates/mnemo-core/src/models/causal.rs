//! Typed causal edges between memories.
//!
//! Edge endpoints are stored as strings for forward compatibility with
//! non-integer identifiers; traversal keys its visited set on the string
//! form, never on row identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CausalError, MnemoResult};

/// The fixed set of relation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CausalRelation {
    Caused,
    Enabled,
    Supersedes,
    Contradicts,
    DerivedFrom,
    Supports,
}

impl CausalRelation {
    /// All relation kinds, in canonical order.
    pub const ALL: [CausalRelation; 6] = [
        Self::Caused,
        Self::Enabled,
        Self::Supersedes,
        Self::Contradicts,
        Self::DerivedFrom,
        Self::Supports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caused => "caused",
            Self::Enabled => "enabled",
            Self::Supersedes => "supersedes",
            Self::Contradicts => "contradicts",
            Self::DerivedFrom => "derived_from",
            Self::Supports => "supports",
        }
    }

    pub fn parse(value: &str) -> MnemoResult<Self> {
        match value {
            "caused" => Ok(Self::Caused),
            "enabled" => Ok(Self::Enabled),
            "supersedes" => Ok(Self::Supersedes),
            "contradicts" => Ok(Self::Contradicts),
            "derived_from" => Ok(Self::DerivedFrom),
            "supports" => Ok(Self::Supports),
            other => Err(CausalError::UnknownRelation {
                value: other.to_string(),
            }
            .into()),
        }
    }
}

impl std::fmt::Display for CausalRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed typed link between two memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalEdge {
    pub id: i64,
    pub source_id: String,
    pub target_id: String,
    pub relation: CausalRelation,
    /// Confidence in the link, in [0, 1].
    pub strength: f64,
    pub evidence: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl CausalEdge {
    /// Validate endpoint, relation-set and strength invariants.
    pub fn validate(&self) -> MnemoResult<()> {
        if self.source_id.is_empty() || self.target_id.is_empty() {
            return Err(crate::MnemoError::validation(
                "edge endpoints must be non-empty",
            ));
        }
        if self.source_id == self.target_id {
            return Err(CausalError::SelfLoop {
                id: self.source_id.clone(),
            }
            .into());
        }
        if !self.strength.is_finite() || !(0.0..=1.0).contains(&self.strength) {
            return Err(CausalError::StrengthOutOfRange {
                value: self.strength,
            }
            .into());
        }
        Ok(())
    }
}

/// Which way a traversal walks the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalDirection {
    Outgoing,
    Incoming,
    Both,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: &str, target: &str, strength: f64) -> CausalEdge {
        CausalEdge {
            id: 0,
            source_id: source.into(),
            target_id: target.into(),
            relation: CausalRelation::Caused,
            strength,
            evidence: None,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_self_loop() {
        assert!(edge("a", "a", 0.5).validate().is_err());
    }

    #[test]
    fn rejects_non_finite_and_out_of_range_strength() {
        assert!(edge("a", "b", f64::NAN).validate().is_err());
        assert!(edge("a", "b", 1.2).validate().is_err());
        assert!(edge("a", "b", -0.1).validate().is_err());
        assert!(edge("a", "b", 0.0).validate().is_ok());
        assert!(edge("a", "b", 1.0).validate().is_ok());
    }

    #[test]
    fn relation_parse_roundtrip() {
        for relation in CausalRelation::ALL {
            assert_eq!(CausalRelation::parse(relation.as_str()).unwrap(), relation);
        }
        assert!(CausalRelation::parse("invented").is_err());
    }
}
