//! Process state documents.
//!
//! Small JSON documents keyed by a short string (`aed`, `country`),
//! carrying the last successful update timestamp and a schema version
//! used to gate migrations between incompatible ingest revisions.

use moosicbox_json_utils::database::ToValue as _;
use serde::{Deserialize, Serialize};
use switchy_database::{Database, DatabaseValue};

use crate::DbError;

/// The parsed shape of a state document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateDoc {
    /// Epoch seconds of the last successful update.
    pub update_timestamp: f64,
    /// Schema version of the ingest that wrote the document.
    #[serde(default = "default_version")]
    pub version: i64,
}

const fn default_version() -> i64 {
    1
}

impl StateDoc {
    /// Creates a document for the given timestamp and schema version.
    #[must_use]
    pub const fn new(update_timestamp: f64, version: i64) -> Self {
        Self {
            update_timestamp,
            version,
        }
    }
}

/// Fetches and parses a state document.
///
/// Returns `None` when the key is absent; a present but unparsable
/// document is an error.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the document is invalid.
pub async fn get(db: &dyn Database, key: &str) -> Result<Option<StateDoc>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT data::text AS data FROM state WHERE key = $1",
            &[DatabaseValue::String(key.to_string())],
        )
        .await?;

    let Some(row) = rows.first() else {
        return Ok(None);
    };

    let raw: String = row
        .to_value("data")
        .map_err(|e| DbError::conversion(format!("Failed to read state data: {e}")))?;

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| DbError::conversion(format!("Invalid state document {key:?}: {e}")))
}

/// Writes a state document, replacing any previous value.
///
/// Safe to call inside a surrounding transaction; the statement itself
/// is a single upsert.
///
/// # Errors
///
/// Returns [`DbError`] if the statement fails.
pub async fn set(db: &dyn Database, key: &str, doc: StateDoc) -> Result<(), DbError> {
    let data = serde_json::to_string(&doc)
        .map_err(|e| DbError::conversion(format!("State document to JSON: {e}")))?;

    db.exec_raw_params(
        "INSERT INTO state (key, data) VALUES ($1, $2::jsonb)
         ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data",
        &[
            DatabaseValue::String(key.to_string()),
            DatabaseValue::String(data),
        ],
    )
    .await?;

    Ok(())
}
