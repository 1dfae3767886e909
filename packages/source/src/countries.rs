//! Country polygon feed download and decoding.

use std::collections::BTreeMap;

use geo::{Geometry, Point};
use openaedmap_source_models::CountryFeature;

use crate::{SourceError, ensure_success};

/// Downloads and decodes the zstd-compressed country polygon bundle.
///
/// Each GeoJSON feature yields a prospective country row: the boundary
/// geometry, the upstream tags, a representative interior point, and the
/// feed generation timestamp.
///
/// # Errors
///
/// Returns [`SourceError`] on transport failure, a zstd error, or a
/// feature that does not carry the expected properties.
pub async fn get_osm_countries(
    client: &reqwest::Client,
) -> Result<Vec<CountryFeature>, SourceError> {
    let response = ensure_success(client.get(openaedmap_config::country_geojson_url()).send().await?)?;
    let compressed = response.bytes().await?;

    let buffer = zstd::stream::decode_all(compressed.as_ref())?;
    let collection: geojson::FeatureCollection =
        serde_json::from_slice(&buffer).map_err(|e| SourceError::SuspiciousFeed {
            message: format!("Country feed is not a FeatureCollection: {e}"),
        })?;

    collection
        .features
        .into_iter()
        .map(parse_country_feature)
        .collect()
}

/// Converts one GeoJSON feature into a [`CountryFeature`].
fn parse_country_feature(feature: geojson::Feature) -> Result<CountryFeature, SourceError> {
    let suspicious = |message: String| SourceError::SuspiciousFeed { message };

    let geometry = feature
        .geometry
        .ok_or_else(|| suspicious("Country feature missing geometry".to_string()))?;
    let geometry: Geometry<f64> = geometry
        .try_into()
        .map_err(|e| suspicious(format!("Country feature geometry: {e}")))?;

    if !matches!(geometry, Geometry::Polygon(_) | Geometry::MultiPolygon(_)) {
        return Err(suspicious("Country geometry is not a polygon".to_string()));
    }

    let properties = feature
        .properties
        .ok_or_else(|| suspicious("Country feature missing properties".to_string()))?;

    let tags: BTreeMap<String, String> = properties
        .get("tags")
        .and_then(|v| v.as_object())
        .ok_or_else(|| suspicious("Country feature missing tags".to_string()))?
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();

    let representative_point = properties
        .get("representative_point")
        .cloned()
        .and_then(|v| serde_json::from_value::<geojson::Geometry>(v).ok())
        .and_then(|g| Geometry::<f64>::try_from(g).ok())
        .and_then(|g| Point::try_from(g).ok())
        .ok_or_else(|| suspicious("Country feature missing representative point".to_string()))?;

    let timestamp = properties
        .get("timestamp")
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| suspicious("Country feature missing timestamp".to_string()))?;

    Ok(CountryFeature {
        tags,
        geometry,
        representative_point,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_feature() -> geojson::Feature {
        let raw = serde_json::json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]]]
            },
            "properties": {
                "tags": {"ISO3166-1": "PL", "name": "Polska"},
                "representative_point": {"type": "Point", "coordinates": [1.0, 1.0]},
                "timestamp": 1_717_243_200.0
            }
        });
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn parses_a_complete_feature() {
        let country = parse_country_feature(sample_feature()).unwrap();
        assert_eq!(country.tags.get("ISO3166-1").unwrap(), "PL");
        assert!(matches!(country.geometry, Geometry::Polygon(_)));
        assert!((country.representative_point.x() - 1.0).abs() < 1e-12);
        assert!((country.timestamp - 1_717_243_200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_point_geometry() {
        let mut feature = sample_feature();
        feature.geometry = Some(geojson::Geometry::new(geojson::Value::Point(vec![0.0, 0.0])));
        assert!(parse_country_feature(feature).is_err());
    }

    #[test]
    fn rejects_missing_tags() {
        let mut feature = sample_feature();
        feature
            .properties
            .as_mut()
            .unwrap()
            .remove("tags");
        assert!(parse_country_feature(feature).is_err());
    }
}
