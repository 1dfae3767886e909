#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Vector tile encoding.
//!
//! Country tiles (low zoom) carry simplified country polygons plus their
//! label points; AED tiles (high zoom) carry individual AEDs and
//! clustered groups. Feature coordinates are projected to web mercator,
//! quantized to the tile extent, and encoded with the `mvt` crate.

pub mod mercator;

use geo::{Geometry, Point};
use mvt::{GeomEncoder, GeomType, Tile};
use openaedmap_aed_models::AedOrGroup;
use openaedmap_config::MVT_EXTENT;
use openaedmap_geography_models::BBox;

use crate::mercator::project_mercator;

/// Errors that can occur while encoding a tile.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    /// The vector-tile encoder rejected the geometry or layer.
    #[error("Tile encoding failed: {message}")]
    Encode {
        /// Description of what went wrong.
        message: String,
    },
}

fn encode_err(error: impl std::fmt::Display) -> TileError {
    TileError::Encode {
        message: error.to_string(),
    }
}

/// One country rendered into a country tile.
#[derive(Debug, Clone)]
pub struct CountryTileEntry {
    /// Display name for the requested language.
    pub name: String,
    /// Country code.
    pub code: String,
    /// Number of AEDs assigned to the country.
    pub point_count: u64,
    /// Boundary, already simplified for the zoom.
    pub geometry: Geometry<f64>,
    /// Label point.
    pub label_position: Point<f64>,
}

/// Maps lon/lat coordinates into quantized tile space.
///
/// The tile bbox corners are projected once; every feature coordinate
/// then lands on the integer grid `[0, extent]`, with y flipped into
/// the screen orientation the encoding expects.
struct Quantizer {
    x_min: f64,
    y_max: f64,
    x_span: f64,
    y_span: f64,
    extent: f64,
}

impl Quantizer {
    fn new(bbox: &BBox) -> Self {
        let (x_min, y_min) = project_mercator(bbox.p1.lon, bbox.p1.lat);
        let (x_max, y_max) = project_mercator(bbox.p2.lon, bbox.p2.lat);
        Self {
            x_min,
            y_max,
            x_span: x_max - x_min,
            y_span: y_max - y_min,
            extent: f64::from(MVT_EXTENT),
        }
    }

    fn quantize(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (x, y) = project_mercator(lon, lat);
        let tile_x = ((x - self.x_min) / self.x_span * self.extent).round();
        let tile_y = ((self.y_max - y) / self.y_span * self.extent).round();
        (tile_x, tile_y)
    }
}

/// Encodes a country tile: a `countries` layer with the boundary
/// polygons and a `defibrillators` layer with their label points, both
/// carrying name, code, and count properties.
///
/// # Errors
///
/// Returns [`TileError`] if the encoder rejects a geometry or layer.
pub fn encode_country_tile(
    bbox: &BBox,
    entries: &[CountryTileEntry],
) -> Result<Vec<u8>, TileError> {
    let quantizer = Quantizer::new(bbox);
    let mut tile = Tile::new(MVT_EXTENT);

    let mut countries = tile.create_layer("countries");
    for entry in entries {
        let geom_data = encode_polygons(&quantizer, &entry.geometry)?;
        let mut feature = countries.into_feature(geom_data);
        feature.add_tag_string("country_name", &entry.name);
        feature.add_tag_string("country_code", &entry.code);
        feature.add_tag_uint("point_count", entry.point_count);
        feature.add_tag_string("point_count_abbreviated", &abbreviate(entry.point_count));
        countries = feature.into_layer();
    }
    tile.add_layer(countries).map_err(encode_err)?;

    let mut labels = tile.create_layer("defibrillators");
    for entry in entries {
        let (x, y) = quantizer.quantize(entry.label_position.x(), entry.label_position.y());
        let geom_data = GeomEncoder::new(GeomType::Point)
            .point(x, y)
            .and_then(GeomEncoder::encode)
            .map_err(encode_err)?;
        let mut feature = labels.into_feature(geom_data);
        feature.add_tag_string("country_name", &entry.name);
        feature.add_tag_string("country_code", &entry.code);
        feature.add_tag_uint("point_count", entry.point_count);
        feature.add_tag_string("point_count_abbreviated", &abbreviate(entry.point_count));
        labels = feature.into_layer();
    }
    tile.add_layer(labels).map_err(encode_err)?;

    tile.to_bytes().map_err(encode_err)
}

/// Encodes an AED tile: one `defibrillators` layer where each feature
/// is either a single AED or a clustered group.
///
/// # Errors
///
/// Returns [`TileError`] if the encoder rejects a geometry or layer.
pub fn encode_aed_tile(bbox: &BBox, features: &[AedOrGroup]) -> Result<Vec<u8>, TileError> {
    let quantizer = Quantizer::new(bbox);
    let mut tile = Tile::new(MVT_EXTENT);

    let mut layer = tile.create_layer("defibrillators");
    for entry in features {
        let position = entry.position();
        let (x, y) = quantizer.quantize(position.x(), position.y());
        let geom_data = GeomEncoder::new(GeomType::Point)
            .point(x, y)
            .and_then(GeomEncoder::encode)
            .map_err(encode_err)?;

        let mut feature = layer.into_feature(geom_data);
        match entry {
            AedOrGroup::Single(aed) => {
                feature.add_tag_uint("node_id", u64::try_from(aed.id).unwrap_or(0));
                feature.add_tag_string("access", aed.access());
            }
            AedOrGroup::Group(group) => {
                feature.add_tag_uint("point_count", group.count);
                feature.add_tag_string("point_count_abbreviated", &abbreviate(group.count));
                feature.add_tag_string("access", &group.access);
            }
        }
        layer = feature.into_layer();
    }
    tile.add_layer(layer).map_err(encode_err)?;

    tile.to_bytes().map_err(encode_err)
}

/// Encodes a polygon or multipolygon, ring by ring.
fn encode_polygons(quantizer: &Quantizer, geometry: &Geometry<f64>) -> Result<mvt::GeomData, TileError> {
    let polygons: Vec<&geo::Polygon<f64>> = match geometry {
        Geometry::Polygon(polygon) => vec![polygon],
        Geometry::MultiPolygon(multi) => multi.0.iter().collect(),
        other => {
            return Err(TileError::Encode {
                message: format!("Unsupported country geometry: {other:?}"),
            });
        }
    };

    let mut encoder = GeomEncoder::new(GeomType::Polygon);
    for polygon in polygons {
        encoder = encode_ring(quantizer, encoder, polygon.exterior())?;
        for interior in polygon.interiors() {
            encoder = encode_ring(quantizer, encoder, interior)?;
        }
    }

    encoder.encode().map_err(encode_err)
}

/// Pushes one ring; the closing duplicate vertex is dropped because the
/// encoding closes rings itself.
fn encode_ring(
    quantizer: &Quantizer,
    mut encoder: GeomEncoder<f64>,
    ring: &geo::LineString<f64>,
) -> Result<GeomEncoder<f64>, TileError> {
    let coords = &ring.0;
    let open = if coords.len() > 1 && coords.first() == coords.last() {
        &coords[..coords.len() - 1]
    } else {
        coords.as_slice()
    };

    for coord in open {
        let (x, y) = quantizer.quantize(coord.x, coord.y);
        encoder = encoder.point(x, y).map_err(encode_err)?;
    }

    encoder.complete_geom().map_err(encode_err)?;
    Ok(encoder)
}

/// Compacts a count for display: `1.2k`, `3.4m`, or the plain number.
#[must_use]
pub fn abbreviate(num: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let n = num as f64;
    if num >= 1_000_000 {
        format!("{:.1}m", n / 1_000_000.0)
    } else if num >= 1_000 {
        format!("{:.1}k", n / 1_000.0)
    } else {
        num.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};
    use openaedmap_aed_models::{Aed, AedGroup};
    use openaedmap_geography_models::LonLat;
    use std::collections::BTreeMap;

    use crate::mercator::tile_to_bbox;

    #[test]
    fn abbreviation_matches_display_rules() {
        assert_eq!(abbreviate(0), "0");
        assert_eq!(abbreviate(999), "999");
        assert_eq!(abbreviate(1_000), "1.0k");
        assert_eq!(abbreviate(1_250), "1.2k");
        assert_eq!(abbreviate(999_999), "1000.0k");
        assert_eq!(abbreviate(1_500_000), "1.5m");
    }

    #[test]
    fn quantized_corners_land_on_the_extent_bounds() {
        let bbox = tile_to_bbox(3, 4, 2);
        let quantizer = Quantizer::new(&bbox);

        let (x, y) = quantizer.quantize(bbox.p1.lon, bbox.p2.lat);
        assert!((x - 0.0).abs() < f64::EPSILON);
        assert!((y - 0.0).abs() < f64::EPSILON);

        let (x, y) = quantizer.quantize(bbox.p2.lon, bbox.p1.lat);
        assert!((x - f64::from(MVT_EXTENT)).abs() < f64::EPSILON);
        assert!((y - f64::from(MVT_EXTENT)).abs() < f64::EPSILON);
    }

    #[test]
    fn quantized_interior_points_stay_in_range() {
        let bbox = BBox::new(LonLat::new(10.0, 40.0), LonLat::new(11.0, 41.0));
        let quantizer = Quantizer::new(&bbox);
        let (x, y) = quantizer.quantize(10.5, 40.5);
        assert!(x >= 0.0 && x <= f64::from(MVT_EXTENT));
        assert!(y >= 0.0 && y <= f64::from(MVT_EXTENT));
    }

    #[test]
    fn encodes_an_aed_tile_with_singles_and_groups() {
        let bbox = tile_to_bbox(10, 571, 335);
        let mut tags = BTreeMap::new();
        tags.insert("emergency".to_string(), "defibrillator".to_string());

        let center_lon = f64::midpoint(bbox.p1.lon, bbox.p2.lon);
        let center_lat = f64::midpoint(bbox.p1.lat, bbox.p2.lat);

        let features = vec![
            AedOrGroup::Single(Aed {
                id: 42,
                version: 1,
                tags,
                position: Point::new(center_lon, center_lat),
                country_codes: Some(Vec::new()),
            }),
            AedOrGroup::Group(AedGroup {
                position: Point::new(center_lon + 0.001, center_lat),
                count: 7,
                access: "yes".to_string(),
            }),
        ];

        let bytes = encode_aed_tile(&bbox, &features).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn encodes_a_country_tile() {
        let bbox = tile_to_bbox(3, 4, 2);
        let ring = LineString::from(vec![
            (bbox.p1.lon, bbox.p1.lat),
            (bbox.p2.lon, bbox.p1.lat),
            (bbox.p2.lon, bbox.p2.lat),
            (bbox.p1.lon, bbox.p2.lat),
            (bbox.p1.lon, bbox.p1.lat),
        ]);
        let entries = vec![CountryTileEntry {
            name: "Poland".to_string(),
            code: "PL".to_string(),
            point_count: 4_200,
            geometry: Geometry::Polygon(Polygon::new(ring, Vec::new())),
            label_position: Point::new(
                f64::midpoint(bbox.p1.lon, bbox.p2.lon),
                f64::midpoint(bbox.p1.lat, bbox.p2.lat),
            ),
        }];

        let bytes = encode_country_tile(&bbox, &entries).unwrap();
        assert!(!bytes.is_empty());
    }
}
