//! Geometry exchange at the SQL boundary.
//!
//! Reads come back as hex-encoded WKB (`encode(ST_AsBinary(..), 'hex')`)
//! and are decoded once per row; writes go through WKT or GeoJSON bound
//! parameters.

use geo::Geometry;
use wkt::ToWkt;

use crate::DbError;

/// Decodes a hex-encoded WKB column into a geometry.
pub(crate) fn decode_wkb_hex(raw: &str) -> Result<Geometry<f64>, DbError> {
    let bytes =
        hex::decode(raw).map_err(|e| DbError::conversion(format!("Invalid WKB hex: {e}")))?;
    wkb::wkb_to_geom(&mut bytes.as_slice())
        .map_err(|e| DbError::conversion(format!("Invalid WKB geometry: {e:?}")))
}

/// Renders a geometry as WKT for an `ST_GeomFromText` bound parameter.
pub(crate) fn to_wkt_param(geometry: &Geometry<f64>) -> String {
    geometry.wkt_string()
}

/// Renders a geometry as GeoJSON for an `ST_GeomFromGeoJSON` bound
/// parameter.
pub(crate) fn to_geojson_param(geometry: &Geometry<f64>) -> Result<String, DbError> {
    let encoded = geojson::Geometry::new(geojson::Value::from(geometry));
    serde_json::to_string(&encoded)
        .map_err(|e| DbError::conversion(format!("Geometry to GeoJSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point, Polygon};

    #[test]
    fn wkt_param_renders_points_and_polygons() {
        let point: Geometry<f64> = Point::new(21.0, 52.2).into();
        assert!(to_wkt_param(&point).starts_with("POINT"));

        let polygon: Geometry<f64> = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            Vec::new(),
        )
        .into();
        assert!(to_wkt_param(&polygon).starts_with("POLYGON"));
    }

    #[test]
    fn geojson_param_round_trips_through_the_geojson_crate() {
        let polygon: Geometry<f64> = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 0.0)]),
            Vec::new(),
        )
        .into();
        let raw = to_geojson_param(&polygon).unwrap();
        let parsed: geojson::Geometry = raw.parse().unwrap();
        let back: Geometry<f64> = parsed.try_into().unwrap();
        assert_eq!(back, polygon);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(decode_wkb_hex("zz").is_err());
    }

    #[test]
    fn decodes_little_endian_point_wkb() {
        // POINT(1 2), little-endian.
        let raw = "0101000000000000000000f03f0000000000000040";
        let decoded = decode_wkb_hex(raw).unwrap();
        assert_eq!(decoded, Geometry::Point(Point::new(1.0, 2.0)));
    }
}
