#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Upstream fetchers for the AED pipeline.
//!
//! Three upstreams are consumed: the Overpass interpreter (bulk JSON
//! snapshots), the minute-grain replication stream (`state.txt` plus
//! gzipped osmChange diffs), and the zstd-compressed country polygon
//! bundle. All traffic goes through one [`reqwest`] client carrying the
//! product `User-Agent` and the default connect/total timeouts.

pub mod countries;
pub mod osc;
pub mod overpass;
pub mod replication;
pub mod retry;

use std::time::Duration;

/// Errors that can occur while fetching or decoding upstream data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transport failure, timeout, or decode error on the wire.
    #[error("Upstream unavailable: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("Upstream unavailable: HTTP {status} from {url}")]
    UpstreamStatus {
        /// Response status code.
        status: reqwest::StatusCode,
        /// Request URL.
        url: String,
    },

    /// An osmChange document that cannot be parsed.
    #[error("Malformed diff: {message}")]
    MalformedDiff {
        /// Description of what went wrong.
        message: String,
    },

    /// An Overpass response that cannot be interpreted.
    #[error("Malformed snapshot: {message}")]
    MalformedSnapshot {
        /// Description of what went wrong.
        message: String,
    },

    /// A payload that parsed but fails a sanity check.
    #[error("Suspicious feed: {message}")]
    SuspiciousFeed {
        /// Description of the failed check.
        message: String,
    },

    /// A multi-request operation exceeded its overall deadline.
    #[error("Upstream unavailable: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while decompressing a payload.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the shared upstream HTTP client.
///
/// `timeout` is the total per-request timeout; the bulk snapshot path
/// passes its own much larger value.
///
/// # Errors
///
/// Returns [`SourceError`] if the client cannot be built.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .user_agent(openaedmap_config::USER_AGENT)
        .connect_timeout(openaedmap_config::HTTP_CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .map_err(Into::into)
}

/// Returns the response if it has a success status, the typed error
/// otherwise.
///
/// # Errors
///
/// Returns [`SourceError::UpstreamStatus`] on a non-2xx response.
pub fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SourceError::UpstreamStatus {
            status,
            url: response.url().to_string(),
        })
    }
}

/// Parses an upstream `%Y-%m-%dT%H:%M:%SZ` timestamp into epoch seconds.
///
/// # Errors
///
/// Returns [`SourceError::MalformedSnapshot`] if the timestamp does not
/// match the upstream format.
pub fn parse_osm_timestamp(raw: &str) -> Result<f64, SourceError> {
    let parsed = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ").map_err(|e| {
        SourceError::MalformedSnapshot {
            message: format!("Invalid timestamp {raw:?}: {e}"),
        }
    })?;
    #[allow(clippy::cast_precision_loss)]
    Ok(parsed.and_utc().timestamp() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upstream_timestamps() {
        let ts = parse_osm_timestamp("2024-01-01T00:00:00Z").unwrap();
        assert!((ts - 1_704_067_200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_other_timestamp_formats() {
        assert!(parse_osm_timestamp("2024-01-01 00:00:00").is_err());
        assert!(parse_osm_timestamp("garbage").is_err());
    }
}
