#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Background ingestion of AEDs and country polygons.
//!
//! The primary worker runs two long-lived tasks: the country refresh
//! (daily) and the AED update (every 30 seconds, either a full Overpass
//! snapshot or an incremental replication-diff pass). Both conform to
//! the same contract: announce "started" after the first successful
//! pass, retry forever with exponential backoff, and share no state
//! across iterations beyond what the database holds.

pub mod aed;
pub mod country;
pub mod schedule;

use openaedmap_database::DbError;
use openaedmap_source::SourceError;

/// Errors that can occur during an ingest run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Upstream fetch or decode failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Database failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// A feed that parsed but fails a sanity check.
    #[error("Suspicious feed: {message}")]
    SuspiciousFeed {
        /// Description of the failed check.
        message: String,
    },
}

/// Current wall-clock time as epoch seconds.
#[must_use]
pub(crate) fn now_epoch() -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}
