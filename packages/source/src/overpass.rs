//! Overpass bulk snapshot queries.

use openaedmap_source_models::{OverpassElement, OverpassResponse};

use crate::{SourceError, ensure_success, parse_osm_timestamp};

/// The fixed snapshot query; selects every defibrillator node with its
/// metadata, in quadtile order.
pub const SNAPSHOT_QUERY: &str = "node[emergency=defibrillator];out meta qt;";

/// Runs a query against the Overpass interpreter.
///
/// Returns the matched elements and the database timestamp the snapshot
/// reflects. `timeout_secs` is forwarded to the interpreter as the
/// server-side budget; the caller's client must carry a matching (or
/// larger) total timeout. Refuses empty results: a zero-element answer
/// on a planet-wide query means upstream maintenance, not an empty
/// planet.
///
/// # Errors
///
/// Returns [`SourceError`] on transport failure, a non-success status,
/// an unparsable response, or an empty element list.
pub async fn query_overpass(
    client: &reqwest::Client,
    timeout_secs: u64,
) -> Result<(Vec<OverpassElement>, f64), SourceError> {
    let query = format!("[out:json][timeout:{timeout_secs}];{SNAPSHOT_QUERY}");

    // Client-side budget doubles the server-side one so slow responses
    // are not cut off mid-body.
    let response = client
        .post(openaedmap_config::overpass_api_url())
        .form(&[("data", query.as_str())])
        .timeout(std::time::Duration::from_secs(timeout_secs.saturating_mul(2)))
        .send()
        .await?;
    let response = ensure_success(response)?;

    let body: OverpassResponse =
        response
            .json()
            .await
            .map_err(|e| SourceError::MalformedSnapshot {
                message: format!("Invalid Overpass response: {e}"),
            })?;

    let data_timestamp = parse_osm_timestamp(&body.osm3s.timestamp_osm_base)?;

    if body.elements.is_empty() {
        return Err(SourceError::SuspiciousFeed {
            message: "Overpass returned no elements".to_string(),
        });
    }

    Ok((body.elements, data_timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_query_targets_defibrillator_nodes() {
        assert!(SNAPSHOT_QUERY.starts_with("node[emergency=defibrillator]"));
        assert!(SNAPSHOT_QUERY.ends_with("out meta qt;"));
    }

    #[test]
    fn overpass_response_parses_elements_and_timestamp() {
        let raw = r#"{
            "osm3s": {"timestamp_osm_base": "2024-06-01T12:00:00Z"},
            "elements": [
                {"type": "node", "id": 42, "version": 3, "lon": 21.0, "lat": 52.2,
                 "tags": {"emergency": "defibrillator", "access": "yes"}}
            ]
        }"#;
        let body: OverpassResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.elements.len(), 1);
        assert_eq!(body.elements[0].id, 42);
        assert_eq!(body.elements[0].tags.get("access").unwrap(), "yes");
        assert!(parse_osm_timestamp(&body.osm3s.timestamp_osm_base).is_ok());
    }

    #[test]
    fn elements_without_tags_default_to_empty() {
        let raw = r#"{
            "osm3s": {"timestamp_osm_base": "2024-06-01T12:00:00Z"},
            "elements": [{"type": "node", "id": 1, "version": 1, "lon": 0.0, "lat": 0.0}]
        }"#;
        let body: OverpassResponse = serde_json::from_str(raw).unwrap();
        assert!(body.elements[0].tags.is_empty());
    }
}
