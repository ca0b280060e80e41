//! SQL query modules. Each function borrows a connection for the
//! duration of one call; transactions are owned by the function that
//! opens them.

pub mod access_ops;
pub mod causal_ops;
pub mod history_ops;
pub mod memory_crud;
pub mod refresh_ops;
pub mod vector_ops;
pub mod working_memory_ops;

use chrono::{DateTime, Utc};

use mnemo_core::errors::MnemoResult;

use crate::to_storage_err;

/// Parse an RFC3339 column value.
pub(crate) fn parse_dt(s: &str) -> MnemoResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| to_storage_err(format!("parse datetime '{s}': {e}")))
}

/// Parse an optional RFC3339 column value.
pub(crate) fn parse_dt_opt(s: Option<String>) -> MnemoResult<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_dt).transpose()
}
