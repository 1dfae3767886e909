#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Country polygon types, bounding boxes, and country code assignment.

mod bbox;
mod code;

use std::collections::BTreeMap;

use geo::{Geometry, Point};

pub use bbox::{BBox, LonLat};
pub use code::CountryCodeAssigner;

/// A country polygon row, replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    /// Unique code for this refresh, 2-8 characters.
    pub code: String,
    /// Localized names keyed by upper-cased language code,
    /// with the reserved key `default`.
    pub names: BTreeMap<String, String>,
    /// Country outline (polygon or multipolygon, WGS84).
    pub geometry: Geometry<f64>,
    /// Representative interior point for map labels.
    pub label_position: Point<f64>,
}

impl Country {
    /// The default display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.names.get("default").map_or("", String::as_str)
    }

    /// The display name in the given language, falling back to the default.
    #[must_use]
    pub fn name_for(&self, language: &str) -> &str {
        self.names
            .get(&language.to_uppercase())
            .map_or_else(|| self.name(), String::as_str)
    }
}

/// Builds the localized name map from upstream tags.
///
/// `default` is the first non-empty of `name:en`, `int_name`, `name`;
/// every other `name:XX` tag lands under its upper-cased language code.
#[must_use]
pub fn build_names(tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut names = BTreeMap::new();

    for key in ["name:en", "int_name", "name"] {
        if let Some(default) = tags.get(key).filter(|v| !v.is_empty()) {
            names.insert("default".to_string(), default.clone());
            break;
        }
    }

    for (key, value) in tags {
        if let Some(language) = key.strip_prefix("name:") {
            names.insert(language.to_uppercase(), value.clone());
        }
    }

    names
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
    fn default_name_prefers_english() {
        let names = build_names(&tags(&[
            ("name", "Polska"),
            ("name:en", "Poland"),
            ("int_name", "Poland (int)"),
        ]));
        assert_eq!(names.get("default").unwrap(), "Poland");
    }

    #[test]
    fn default_name_falls_back_to_int_then_local() {
        let names = build_names(&tags(&[("name", "Polska"), ("int_name", "Poland")]));
        assert_eq!(names.get("default").unwrap(), "Poland");

        let names = build_names(&tags(&[("name", "Polska")]));
        assert_eq!(names.get("default").unwrap(), "Polska");
    }

    #[test]
    fn language_keys_are_upper_cased() {
        let names = build_names(&tags(&[("name", "Polska"), ("name:de", "Polen")]));
        assert_eq!(names.get("DE").unwrap(), "Polen");
    }

    #[test]
    fn name_for_falls_back_to_default() {
        let country = Country {
            code: "PL".to_string(),
            names: build_names(&tags(&[("name", "Polska"), ("name:de", "Polen")])),
            geometry: Geometry::Point(Point::new(0.0, 0.0)),
            label_position: Point::new(19.0, 52.0),
        };
        assert_eq!(country.name_for("de"), "Polen");
        assert_eq!(country.name_for("fr"), "Polska");
    }
}
