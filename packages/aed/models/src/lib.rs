#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! AED point feature types shared across the workspace.
//!
//! An AED is an OSM node carrying the `emergency=defibrillator` tag. Read
//! queries may return either raw AEDs or zoom-dependent groups of them;
//! [`AedOrGroup`] is the shared result variant.

use std::collections::BTreeMap;

use geo::Point;

/// The tag key that marks a defibrillator node.
pub const MARKER_KEY: &str = "emergency";

/// The tag value that marks a defibrillator node.
pub const MARKER_VALUE: &str = "defibrillator";

/// An AED point feature, identified by its upstream node id.
#[derive(Debug, Clone, PartialEq)]
pub struct Aed {
    /// Upstream OSM node id.
    pub id: i64,
    /// Upstream revision; never decreases for a given id.
    pub version: i64,
    /// Full OSM tag map of the node.
    pub tags: BTreeMap<String, String>,
    /// WGS84 position (lon, lat).
    pub position: Point<f64>,
    /// Codes of the countries containing the position.
    /// `None` means not yet assigned; empty means over open water.
    pub country_codes: Option<Vec<String>>,
}

impl Aed {
    /// The `access` tag value, defaulting to the empty string.
    #[must_use]
    pub fn access(&self) -> &str {
        self.tags.get("access").map_or("", String::as_str)
    }
}

/// Returns whether a tag map marks a defibrillator node.
#[must_use]
pub fn is_defibrillator(tags: &BTreeMap<String, String>) -> bool {
    tags.get(MARKER_KEY).is_some_and(|v| v == MARKER_VALUE)
}

/// A cluster of nearby AEDs collapsed into one representative point.
#[derive(Debug, Clone, PartialEq)]
pub struct AedGroup {
    /// Cluster centroid (WGS84).
    pub position: Point<f64>,
    /// Number of member AEDs.
    pub count: u64,
    /// Aggregated access label, see [`decide_access`].
    pub access: String,
}

/// A spatial query result: either a raw AED or a group of them.
#[derive(Debug, Clone, PartialEq)]
pub enum AedOrGroup {
    /// A single AED.
    Single(Aed),
    /// A cluster of two or more AEDs.
    Group(AedGroup),
}

impl AedOrGroup {
    /// The feature position (WGS84).
    #[must_use]
    pub const fn position(&self) -> Point<f64> {
        match self {
            Self::Single(aed) => aed.position,
            Self::Group(group) => group.position,
        }
    }

    /// The access label of the feature.
    #[must_use]
    pub fn access(&self) -> &str {
        match self {
            Self::Single(aed) => aed.access(),
            Self::Group(group) => &group.access,
        }
    }
}

/// Ranks an access label; lower tiers are more open.
/// Labels outside the table are unranked.
fn access_tier(access: &str) -> Option<u8> {
    match access {
        "yes" => Some(0),
        "permissive" => Some(1),
        "customers" => Some(2),
        "" | "unknown" => Some(3),
        "private" => Some(4),
        "no" => Some(5),
        _ => None,
    }
}

/// Picks the most open access label among cluster members.
///
/// `yes` short-circuits; unranked labels are ignored; with no ranked
/// member at all the most restrictive label wins.
#[must_use]
pub fn decide_access<'a>(accesses: impl IntoIterator<Item = &'a str>) -> &'a str {
    let mut best: (&str, u8) = ("no", 5);

    for access in accesses {
        match access_tier(access) {
            Some(0) => return access,
            Some(tier) if tier < best.1 => best = (access, tier),
            _ => {}
        }
    }

    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn marker_matches_defibrillator_only() {
        assert!(is_defibrillator(&tags(&[("emergency", "defibrillator")])));
        assert!(!is_defibrillator(&tags(&[("emergency", "fire_extinguisher")])));
        assert!(!is_defibrillator(&tags(&[("amenity", "hospital")])));
    }

    #[test]
    fn access_defaults_to_empty() {
        let aed = Aed {
            id: 1,
            version: 1,
            tags: tags(&[("emergency", "defibrillator")]),
            position: Point::new(0.0, 0.0),
            country_codes: None,
        };
        assert_eq!(aed.access(), "");
    }

    #[test]
    fn decide_access_prefers_most_open() {
        assert_eq!(decide_access(["private", "customers", "no"]), "customers");
        assert_eq!(decide_access(["no", "permissive"]), "permissive");
    }

    #[test]
    fn decide_access_short_circuits_on_yes() {
        assert_eq!(decide_access(["no", "yes", "garbage"]), "yes");
    }

    #[test]
    fn decide_access_ignores_unranked_labels() {
        assert_eq!(decide_access(["designated", "private"]), "private");
        assert_eq!(decide_access(["designated"]), "no");
    }

    #[test]
    fn decide_access_treats_empty_as_unknown_tier() {
        assert_eq!(decide_access(["", "private"]), "");
        assert_eq!(decide_access(["unknown", "no"]), "unknown");
    }

    #[test]
    fn decide_access_is_idempotent() {
        let members = ["customers", "private", "unknown"];
        let first = decide_access(members);
        assert_eq!(decide_access([first, "no", "private"]), first);
    }
}
