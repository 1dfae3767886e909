//! Minute-grain replication stream access.
//!
//! Sequence numbers are formatted as zero-padded nine-digit numbers split
//! into three path segments, e.g. sequence `6123456` lives at
//! `006/123/456.state.txt` and `006/123/456.osc.gz`.

use std::io::Read;
use std::sync::LazyLock;
use std::time::Duration;

use flate2::read::GzDecoder;
use futures::future::join_all;
use openaedmap_config::PLANET_DIFF_TIMEOUT;
use openaedmap_source_models::{NodeAction, ReplicationState};
use regex::Regex;

use crate::retry::retry_exponential;
use crate::{SourceError, ensure_success, osc, parse_osm_timestamp};

/// Backoff start for per-request retries inside a diff window.
const DIFF_RETRY_START: Duration = Duration::from_secs(1);

static SEQUENCE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sequenceNumber=(\d+)").expect("valid regex"));
static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"timestamp=(\S+)").expect("valid regex"));

/// Formats a sequence number as its three-segment replication path.
#[must_use]
pub fn format_sequence_path(sequence_number: u64) -> String {
    let digits = format!("{sequence_number:09}");
    format!("{}/{}/{}", &digits[0..3], &digits[3..6], &digits[6..9])
}

/// Fetches the replication state for a sequence, or the most recent one
/// when `sequence_number` is `None`.
///
/// # Errors
///
/// Returns [`SourceError`] on transport failure or an unparsable state
/// file.
pub async fn get_state(
    client: &reqwest::Client,
    sequence_number: Option<u64>,
) -> Result<ReplicationState, SourceError> {
    let base = openaedmap_config::replication_url();
    let url = sequence_number.map_or_else(
        || format!("{base}state.txt"),
        |n| format!("{base}{}.state.txt", format_sequence_path(n)),
    );

    let response = ensure_success(client.get(&url).send().await?)?;
    let text = response.text().await?;

    parse_state_text(&text)
}

/// Parses a `state.txt` document into a [`ReplicationState`].
///
/// # Errors
///
/// Returns [`SourceError::MalformedDiff`] if the sequence number or
/// timestamp cannot be extracted.
pub fn parse_state_text(text: &str) -> Result<ReplicationState, SourceError> {
    // Java property files escape colons in timestamps.
    let text = text.replace("\\:", ":");

    let sequence_number = SEQUENCE_NUMBER_RE
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .ok_or_else(|| SourceError::MalformedDiff {
            message: "state.txt missing sequenceNumber".to_string(),
        })?;

    let timestamp_raw = TIMESTAMP_RE
        .captures(&text)
        .and_then(|c| c.get(1))
        .ok_or_else(|| SourceError::MalformedDiff {
            message: "state.txt missing timestamp".to_string(),
        })?
        .as_str();

    let sequence_timestamp =
        parse_osm_timestamp(timestamp_raw).map_err(|_| SourceError::MalformedDiff {
            message: format!("state.txt carries invalid timestamp: {timestamp_raw:?}"),
        })?;

    Ok(ReplicationState {
        sequence_number,
        sequence_timestamp,
    })
}

/// Downloads one replication diff, decompresses it, and parses the node
/// actions out of it.
///
/// # Errors
///
/// Returns [`SourceError`] on transport failure, a gzip error, or a
/// malformed osmChange document.
pub async fn get_diff(
    client: &reqwest::Client,
    sequence_number: u64,
) -> Result<Vec<NodeAction>, SourceError> {
    let base = openaedmap_config::replication_url();
    let url = format!("{base}{}.osc.gz", format_sequence_path(sequence_number));

    let response = ensure_success(client.get(&url).send().await?)?;
    let compressed = response.bytes().await?;

    let mut xml = String::new();
    GzDecoder::new(compressed.as_ref()).read_to_string(&mut xml)?;

    osc::parse_osm_change(&xml)
}

/// Collects and parses every replication diff newer than `last_update`.
///
/// Discovery walks `state.txt` backwards from the newest sequence until
/// it reaches one at or before `last_update`. The diffs are then fetched
/// concurrently, re-ordered by ascending sequence number, and flattened,
/// so later actions supersede earlier ones downstream. Returns the
/// newest sequence timestamp, or `last_update` itself when there is
/// nothing to apply. The whole window is bounded by
/// [`PLANET_DIFF_TIMEOUT`].
///
/// # Errors
///
/// Returns [`SourceError`] if discovery or any diff fetch fails past its
/// retry budget, or the window deadline expires.
pub async fn get_planet_diffs(
    client: &reqwest::Client,
    last_update: f64,
) -> Result<(Vec<NodeAction>, f64), SourceError> {
    tokio::time::timeout(PLANET_DIFF_TIMEOUT, async {
        let mut sequences: Vec<ReplicationState> = Vec::new();

        loop {
            let next = match sequences.last() {
                Some(state) if state.sequence_number == 0 => break,
                Some(state) => Some(state.sequence_number - 1),
                None => None,
            };

            let state = retry_exponential(
                Some(openaedmap_config::aed_rebuild_threshold()),
                DIFF_RETRY_START,
                "Replication state fetch",
                || get_state(client, next),
            )
            .await?;

            if state.sequence_timestamp <= last_update {
                break;
            }
            sequences.push(state);
        }

        let Some(newest) = sequences.first() else {
            return Ok((Vec::new(), last_update));
        };
        let data_timestamp = newest.sequence_timestamp;

        let fetches = sequences.iter().map(|state| {
            let sequence_number = state.sequence_number;
            async move {
                let actions = retry_exponential(
                    Some(openaedmap_config::aed_rebuild_threshold()),
                    DIFF_RETRY_START,
                    "Replication diff fetch",
                    || get_diff(client, sequence_number),
                )
                .await?;
                Ok::<_, SourceError>((sequence_number, actions))
            }
        });

        let mut numbered: Vec<(u64, Vec<NodeAction>)> =
            join_all(fetches).await.into_iter().collect::<Result<_, _>>()?;
        numbered.sort_by_key(|(sequence_number, _)| *sequence_number);

        let actions = numbered
            .into_iter()
            .flat_map(|(_, actions)| actions)
            .collect();

        Ok((actions, data_timestamp))
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sequence_path_is_zero_padded_and_segmented() {
        assert_eq!(format_sequence_path(6_123_456), "006/123/456");
        assert_eq!(format_sequence_path(42), "000/000/042");
        assert_eq!(format_sequence_path(999_999_999), "999/999/999");
    }

    #[test]
    fn state_text_parses_with_escaped_colons() {
        let state = parse_state_text(
            "#Sat Jun 01 12:00:00 UTC 2024\n\
             sequenceNumber=6123456\n\
             timestamp=2024-06-01T12\\:00\\:00Z\n",
        )
        .unwrap();
        assert_eq!(state.sequence_number, 6_123_456);
        assert!(state.sequence_timestamp > 1_717_000_000.0);
    }

    #[test]
    fn state_text_without_sequence_is_rejected() {
        assert!(parse_state_text("timestamp=2024-06-01T12:00:00Z").is_err());
        assert!(parse_state_text("sequenceNumber=1").is_err());
    }

    #[test]
    fn gzip_round_trip_reaches_the_parser() {
        let xml = r#"<osmChange><delete><node id="9" version="2"/></delete></osmChange>"#;
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(xml.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoded = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        let actions = osc::parse_osm_change(&decoded).unwrap();
        assert_eq!(actions.len(), 1);
    }
}
