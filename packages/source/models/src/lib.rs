#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Typed records produced by the upstream fetchers.

use std::collections::BTreeMap;

use geo::{Geometry, Point};
use serde::Deserialize;

/// A node returned by an Overpass snapshot query.
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassElement {
    /// OSM node id.
    pub id: i64,
    /// OSM node version.
    pub version: i64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
    /// OSM tags; absent on metadata-only elements.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// The envelope of an Overpass JSON response.
#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    /// Query metadata.
    pub osm3s: Osm3s,
    /// Matched elements.
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

/// Overpass query metadata.
#[derive(Debug, Deserialize)]
pub struct Osm3s {
    /// Database timestamp the snapshot reflects, `%Y-%m-%dT%H:%M:%SZ`.
    pub timestamp_osm_base: String,
}

/// A node carried by an osmChange create or modify wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffNode {
    /// OSM node id.
    pub id: i64,
    /// OSM node version.
    pub version: i64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
    /// OSM tags.
    pub tags: BTreeMap<String, String>,
}

/// One typed action from an osmChange document.
///
/// Way and relation children are discarded by the parser; only node
/// actions reach this type.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeAction {
    /// A node was created.
    Create(DiffNode),
    /// A node was modified.
    Modify(DiffNode),
    /// A node was deleted.
    Delete {
        /// OSM node id.
        id: i64,
        /// Version of the deleting revision.
        version: i64,
    },
}

impl NodeAction {
    /// The node id the action applies to.
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Create(node) | Self::Modify(node) => node.id,
            Self::Delete { id, .. } => *id,
        }
    }

    /// The revision the action carries.
    #[must_use]
    pub const fn version(&self) -> i64 {
        match self {
            Self::Create(node) | Self::Modify(node) => node.version,
            Self::Delete { version, .. } => *version,
        }
    }
}

/// A point on the minute-grain replication stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicationState {
    /// Upstream sequence number.
    pub sequence_number: u64,
    /// Epoch seconds of the sequence.
    pub sequence_timestamp: f64,
}

/// One prospective country row from the polygon feed.
#[derive(Debug, Clone)]
pub struct CountryFeature {
    /// Upstream OSM tags of the boundary relation.
    pub tags: BTreeMap<String, String>,
    /// Country outline (polygon or multipolygon).
    pub geometry: Geometry<f64>,
    /// Representative interior point.
    pub representative_point: Point<f64>,
    /// Epoch seconds the feed was generated at.
    pub timestamp: f64,
}
