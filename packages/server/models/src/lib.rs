#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! HTTP API request and response types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `GET /api/health` response.
#[derive(Debug, Serialize)]
pub struct ApiHealth {
    /// Always `true` when the process answers.
    pub healthy: bool,
    /// Process version, also sent as `X-Version`.
    pub version: String,
}

/// One row of `GET /api/v1/countries/names`.
#[derive(Debug, Serialize)]
pub struct CountryNamesEntry {
    /// Country code, or `WORLD` for the synthetic global entry.
    pub country_code: String,
    /// Localized names (possibly trimmed to the requested language).
    pub country_names: BTreeMap<String, String>,
    /// Number of AEDs assigned to the country.
    pub feature_count: u64,
    /// Path of the matching GeoJSON export.
    pub data_path: String,
}

/// Query parameters of `GET /api/v1/countries/names`.
#[derive(Debug, Deserialize)]
pub struct CountryNamesParams {
    /// Optional two-letter language to trim the name maps to.
    pub language: Option<String>,
}

/// Query parameters of `GET /api/v1/tile/{z}/{x}/{y}.mvt`.
#[derive(Debug, Deserialize)]
pub struct TileParams {
    /// Language for country names on low-zoom tiles.
    pub lang: Option<String>,
}

/// `GET /api/v1/node/{id}` response envelope, shaped like an OSM API
/// answer so map clients can reuse their node parsers.
#[derive(Debug, Serialize)]
pub struct NodeEnvelope {
    /// OSM API version the envelope mimics.
    pub version: f64,
    /// Data copyright statement.
    pub copyright: String,
    /// Attribution URL.
    pub attribution: String,
    /// License URL.
    pub license: String,
    /// The single matched node.
    pub elements: Vec<NodeElement>,
}

/// One node inside a [`NodeEnvelope`].
///
/// The `@`-prefixed keys belong to external collaborators (time-zone
/// lookup and the photo pipeline) and are emitted as `null` here.
#[derive(Debug, Serialize)]
pub struct NodeElement {
    /// Element type, always `node`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Node id.
    pub id: i64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Full OSM tag map.
    pub tags: BTreeMap<String, String>,
    /// Node version.
    pub version: i64,
    /// IANA time-zone name; filled by the time-zone collaborator.
    #[serde(rename = "@timezone_name")]
    pub timezone_name: Option<String>,
    /// UTC offset string; filled by the time-zone collaborator.
    #[serde(rename = "@timezone_offset")]
    pub timezone_offset: Option<String>,
    /// Photo id; filled by the photo collaborator.
    #[serde(rename = "@photo_id")]
    pub photo_id: Option<String>,
    /// Photo URL; filled by the photo collaborator.
    #[serde(rename = "@photo_url")]
    pub photo_url: Option<String>,
    /// Photo source URL; filled by the photo collaborator.
    #[serde(rename = "@photo_source")]
    pub photo_source: Option<String>,
}

impl NodeEnvelope {
    /// Wraps one node in the standard envelope.
    #[must_use]
    pub fn for_node(id: i64, lat: f64, lon: f64, tags: BTreeMap<String, String>, version: i64) -> Self {
        Self {
            version: 0.6,
            copyright: "OpenStreetMap and contributors".to_string(),
            attribution: "https://www.openstreetmap.org/copyright".to_string(),
            license: "https://opendatacommons.org/licenses/odbl/1-0/".to_string(),
            elements: vec![NodeElement {
                kind: "node".to_string(),
                id,
                lat,
                lon,
                tags,
                version,
                timezone_name: None,
                timezone_offset: None,
                photo_id: None,
                photo_url: None,
                photo_source: None,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_envelope_serializes_with_osm_keys() {
        let mut tags = BTreeMap::new();
        tags.insert("emergency".to_string(), "defibrillator".to_string());
        let envelope = NodeEnvelope::for_node(42, 52.2, 21.0, tags, 7);

        let value = serde_json::to_value(&envelope).unwrap();
        assert!((value["version"].as_f64().unwrap() - 0.6).abs() < f64::EPSILON);
        let element = &value["elements"][0];
        assert_eq!(element["type"], "node");
        assert_eq!(element["id"], 42);
        assert_eq!(element["@timezone_name"], serde_json::Value::Null);
        assert_eq!(element["@photo_url"], serde_json::Value::Null);
        assert_eq!(element["tags"]["emergency"], "defibrillator");
    }
}
