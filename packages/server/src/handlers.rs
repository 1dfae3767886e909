//! HTTP handler functions for the AED map API.

use std::collections::BTreeMap;
use std::time::Duration;

use actix_web::http::header;
use actix_web::{HttpResponse, web};
use futures::future::join_all;
use geo::{Geometry, Simplify};
use openaedmap_aed_models::Aed;
use openaedmap_config::{
    COUNTRY_CACHE_MAX_AGE, COUNTRY_NAMES_CACHE_STALE, DEFAULT_CACHE_MAX_AGE, DEFAULT_CACHE_STALE,
    TILE_AEDS_CACHE_STALE, TILE_COUNTRIES_CACHE_MAX_AGE, TILE_COUNTRIES_CACHE_STALE,
    TILE_COUNTRIES_MAX_Z, TILE_MAX_Z, TILE_MIN_Z,
};
use openaedmap_database::{DbError, aed as aed_db, country as country_db};
use openaedmap_geography_models::{BBox, Country};
use openaedmap_server_models::{
    ApiHealth, CountryNamesEntry, CountryNamesParams, NodeEnvelope, TileParams,
};
use openaedmap_spatial::{cluster, eps_for_zoom, simplify_tolerance_for_zoom};
use openaedmap_tile::mercator::tile_to_bbox;
use openaedmap_tile::{CountryTileEntry, TileError, encode_aed_tile, encode_country_tile};
use switchy_database::Database;

use crate::AppState;
use crate::caching::cache_control;

/// Internal failures on the serving path; mapped to 5xx, never retried.
#[derive(Debug, thiserror::Error)]
enum ServeError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Tile(#[from] TileError),
}

fn internal_error(error: &impl std::fmt::Display) -> HttpResponse {
    log::error!("Request failed: {error}");
    HttpResponse::InternalServerError()
        .content_type("text/plain")
        .body("Internal server error")
}

fn bad_request(message: &'static str) -> HttpResponse {
    HttpResponse::BadRequest()
        .content_type("text/plain")
        .body(message)
}

fn not_found(message: String) -> HttpResponse {
    HttpResponse::NotFound()
        .content_type("text/plain")
        .body(message)
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: openaedmap_config::VERSION.to_string(),
    })
}

/// `GET /api/v1/countries/names`
///
/// Lists every country with its AED count plus a synthetic `WORLD`
/// entry carrying the global sum. An optional two-letter `language`
/// trims the name maps to that language and the default.
pub async fn country_names(
    state: web::Data<AppState>,
    params: web::Query<CountryNamesParams>,
) -> HttpResponse {
    let language = params
        .language
        .as_deref()
        .map(str::trim)
        .filter(|lang| !lang.is_empty());
    if let Some(lang) = language
        && lang.len() != 2
    {
        return bad_request("language must be a two-letter code");
    }

    let db = state.db.as_ref();
    let countries = match country_db::get_all(db).await {
        Ok(countries) => countries,
        Err(error) => return internal_error(&error),
    };

    let counts = join_all(
        countries
            .iter()
            .map(|country| state.counts.count_by_country_code(db, &country.code)),
    )
    .await;

    let mut entries = Vec::with_capacity(countries.len() + 1);
    let mut world_count: u64 = 0;

    for (country, count) in countries.iter().zip(counts) {
        let count = match count {
            Ok(count) => count,
            Err(error) => return internal_error(&error),
        };
        world_count += count;

        entries.push(CountryNamesEntry {
            country_code: country.code.clone(),
            country_names: project_names(&country.names, language),
            feature_count: count,
            data_path: format!("/api/v1/countries/{}.geojson", country.code),
        });
    }

    let mut world_names = BTreeMap::new();
    world_names.insert("default".to_string(), "World".to_string());
    entries.push(CountryNamesEntry {
        country_code: "WORLD".to_string(),
        country_names: world_names,
        feature_count: world_count,
        data_path: "/api/v1/countries/WORLD.geojson".to_string(),
    });

    HttpResponse::Ok()
        .insert_header((
            header::CACHE_CONTROL,
            cache_control(COUNTRY_CACHE_MAX_AGE, COUNTRY_NAMES_CACHE_STALE),
        ))
        .json(entries)
}

/// `GET /api/v1/countries/{code}.geojson`
///
/// Exports every AED of a country (or `WORLD` for all of them) as a
/// GeoJSON `FeatureCollection` download.
pub async fn country_geojson(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let code = path.into_inner();
    let db = state.db.as_ref();

    let aeds = if code == "WORLD" {
        aed_db::get_all(db).await
    } else {
        if code.len() < 2 || code.len() > 8 {
            return bad_request("Invalid country code");
        }
        match country_db::get_by_code(db, &code).await {
            Ok(Some(_)) => aed_db::get_by_country_code(db, &code).await,
            Ok(None) => return not_found(format!("Country code {code:?} not found")),
            Err(error) => return internal_error(&error),
        }
    };

    let aeds = match aeds {
        Ok(aeds) => aeds,
        Err(error) => return internal_error(&error),
    };

    let features: Vec<serde_json::Value> = aeds.iter().map(aed_feature).collect();

    HttpResponse::Ok()
        .content_type("application/geo+json")
        .insert_header((header::CONTENT_DISPOSITION, "attachment"))
        .insert_header((
            header::CACHE_CONTROL,
            cache_control(COUNTRY_CACHE_MAX_AGE, Duration::ZERO),
        ))
        .json(serde_json::json!({
            "type": "FeatureCollection",
            "features": features,
        }))
}

/// `GET /api/v1/node/{id}`
///
/// Returns one AED in an OSM-style envelope, 404 when unknown.
pub async fn node(state: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    let id = path.into_inner();

    match aed_db::get_by_id(state.db.as_ref(), id).await {
        Ok(Some(aed)) => {
            let envelope = NodeEnvelope::for_node(
                id,
                aed.position.y(),
                aed.position.x(),
                aed.tags,
                aed.version,
            );
            HttpResponse::Ok()
                .insert_header((
                    header::CACHE_CONTROL,
                    cache_control(DEFAULT_CACHE_MAX_AGE, DEFAULT_CACHE_STALE),
                ))
                .json(envelope)
        }
        Ok(None) => not_found(format!("Node {id} not found")),
        Err(error) => internal_error(&error),
    }
}

/// `GET /api/v1/tile/{z}/{x}/{y}.mvt`
///
/// Low zoom renders country polygons with label counts; higher zoom
/// renders clustered AEDs. Out-of-range addresses are rejected.
pub async fn tile(
    state: web::Data<AppState>,
    path: web::Path<(u32, u32, u32)>,
    params: web::Query<TileParams>,
) -> HttpResponse {
    let (z, x, y) = path.into_inner();
    if !(TILE_MIN_Z..=TILE_MAX_Z).contains(&z) {
        return bad_request("Unsupported zoom level");
    }
    let side = 1_u32 << z;
    if x >= side || y >= side {
        return bad_request("Tile coordinates out of range");
    }

    let lang = params.lang.as_deref().unwrap_or("default");
    let bbox = tile_to_bbox(z, x, y);

    let (encoded, cache) = if z <= TILE_COUNTRIES_MAX_Z {
        (
            build_country_tile(&state, z, &bbox, lang).await,
            cache_control(TILE_COUNTRIES_CACHE_MAX_AGE, TILE_COUNTRIES_CACHE_STALE),
        )
    } else {
        (
            build_aed_tile(&state, z, &bbox).await,
            cache_control(DEFAULT_CACHE_MAX_AGE, TILE_AEDS_CACHE_STALE),
        )
    };

    match encoded {
        Ok(bytes) => HttpResponse::Ok()
            .content_type("application/vnd.mapbox-vector-tile")
            .insert_header((header::CACHE_CONTROL, cache))
            .body(bytes),
        Err(error) => internal_error(&error),
    }
}

/// Builds a country tile: intersecting boundaries simplified for the
/// zoom, with per-country counts fetched through the cache.
async fn build_country_tile(
    state: &AppState,
    z: u32,
    bbox: &BBox,
    lang: &str,
) -> Result<Vec<u8>, ServeError> {
    let db = state.db.as_ref();
    let countries = countries_within(db, bbox).await?;

    let counts = join_all(
        countries
            .iter()
            .map(|country| state.counts.count_by_country_code(db, &country.code)),
    )
    .await;

    let tolerance = simplify_tolerance_for_zoom(z);
    let mut entries = Vec::with_capacity(countries.len());
    for (country, count) in countries.iter().zip(counts) {
        entries.push(CountryTileEntry {
            name: country.name_for(lang).to_string(),
            code: country.code.clone(),
            point_count: count?,
            geometry: simplify_geometry(&country.geometry, tolerance),
            label_position: country.label_position,
        });
    }

    Ok(encode_country_tile(bbox, &entries)?)
}

/// Builds an AED tile: the query box is grown by half the tile span on
/// each side so clusters near edges do not flicker between tiles.
async fn build_aed_tile(state: &AppState, z: u32, bbox: &BBox) -> Result<Vec<u8>, ServeError> {
    let db = state.db.as_ref();
    let query_bbox = bbox.extend(0.5);

    let mut aeds = Vec::new();
    for half in query_bbox.split_antimeridian() {
        let polygon = Geometry::Polygon(half.to_polygon(1));
        aeds.extend(aed_db::get_intersecting(db, &polygon).await?);
    }

    let features = cluster(aeds, eps_for_zoom(z));
    Ok(encode_aed_tile(bbox, &features)?)
}

/// Collects the countries intersecting a bounding box, splitting at the
/// anti-meridian and deduplicating boundaries that straddle it.
async fn countries_within(db: &dyn Database, bbox: &BBox) -> Result<Vec<Country>, DbError> {
    let mut by_code: BTreeMap<String, Country> = BTreeMap::new();

    for half in bbox.split_antimeridian() {
        let polygon = Geometry::Polygon(half.to_polygon(8));
        for country in country_db::get_intersecting(db, &polygon).await? {
            by_code.entry(country.code.clone()).or_insert(country);
        }
    }

    Ok(by_code.into_values().collect())
}

/// Trims a name map to the requested language plus the default entry.
fn project_names(
    names: &BTreeMap<String, String>,
    language: Option<&str>,
) -> BTreeMap<String, String> {
    let Some(language) = language else {
        return names.clone();
    };

    let mut projected = BTreeMap::new();
    for key in ["default".to_string(), language.to_uppercase()] {
        if let Some(value) = names.get(&key) {
            projected.insert(key, value.clone());
        }
    }
    projected
}

/// Renders one AED as a GeoJSON feature with its tags inlined.
fn aed_feature(aed: &Aed) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    properties.insert("@osm_type".to_string(), "node".into());
    properties.insert("@osm_id".to_string(), aed.id.into());
    for (key, value) in &aed.tags {
        properties.insert(key.clone(), value.clone().into());
    }

    serde_json::json!({
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [aed.position.x(), aed.position.y()],
        },
        "properties": properties,
    })
}

/// Simplifies a country boundary for the zoom, leaving other geometry
/// kinds untouched.
fn simplify_geometry(geometry: &Geometry<f64>, tolerance: Option<f64>) -> Geometry<f64> {
    let Some(tolerance) = tolerance else {
        return geometry.clone();
    };

    match geometry {
        Geometry::Polygon(polygon) => Geometry::Polygon(polygon.simplify(tolerance)),
        Geometry::MultiPolygon(multi) => Geometry::MultiPolygon(multi.simplify(tolerance)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    fn names(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn project_names_keeps_full_map_without_language() {
        let all = names(&[("default", "Poland"), ("DE", "Polen"), ("FR", "Pologne")]);
        assert_eq!(project_names(&all, None), all);
    }

    #[test]
    fn project_names_trims_to_language_and_default() {
        let all = names(&[("default", "Poland"), ("DE", "Polen"), ("FR", "Pologne")]);
        let trimmed = project_names(&all, Some("de"));
        assert_eq!(trimmed, names(&[("default", "Poland"), ("DE", "Polen")]));
    }

    #[test]
    fn project_names_falls_back_to_default_only() {
        let all = names(&[("default", "Poland")]);
        assert_eq!(project_names(&all, Some("xx")), names(&[("default", "Poland")]));
    }

    #[test]
    fn aed_feature_inlines_tags_and_identity() {
        let mut tags = BTreeMap::new();
        tags.insert("emergency".to_string(), "defibrillator".to_string());
        tags.insert("access".to_string(), "yes".to_string());
        let aed = Aed {
            id: 17,
            version: 3,
            tags,
            position: Point::new(21.0, 52.2),
            country_codes: Some(vec!["PL".to_string()]),
        };

        let feature = aed_feature(&aed);
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["geometry"]["coordinates"][0], 21.0);
        assert_eq!(feature["properties"]["@osm_type"], "node");
        assert_eq!(feature["properties"]["@osm_id"], 17);
        assert_eq!(feature["properties"]["access"], "yes");
    }
}
