//! Country table queries.
//!
//! The table is replaced wholesale on every successful refresh; reads
//! decode the boundary once per row from hex-encoded WKB.

use std::collections::BTreeMap;

use geo::{Geometry, Point};
use moosicbox_json_utils::database::ToValue as _;
use openaedmap_geography_models::Country;
use switchy_database::{Database, DatabaseValue, Row};

use crate::db::with_transaction;
use crate::state::{self, StateDoc};
use crate::{DbError, geometry};

/// Rows per multi-row INSERT statement.
const INSERT_CHUNK: usize = 50;

/// The shared SELECT column list for country rows.
const COUNTRY_COLUMNS: &str = "code, names::text AS names, \
     encode(ST_AsBinary(geometry), 'hex') AS geometry, \
     ST_X(label_position) AS label_lon, ST_Y(label_position) AS label_lat";

/// Fetches every country.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is invalid.
pub async fn get_all(db: &dyn Database) -> Result<Vec<Country>, DbError> {
    let rows = db
        .query_raw_params(&format!("SELECT {COUNTRY_COLUMNS} FROM country"), &[])
        .await?;

    rows.iter().map(parse_country_row).collect()
}

/// Fetches one country by code.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the row is invalid.
pub async fn get_by_code(db: &dyn Database, code: &str) -> Result<Option<Country>, DbError> {
    let rows = db
        .query_raw_params(
            &format!("SELECT {COUNTRY_COLUMNS} FROM country WHERE code = $1"),
            &[DatabaseValue::String(code.to_string())],
        )
        .await?;

    rows.first().map(parse_country_row).transpose()
}

/// Fetches the countries whose boundary intersects the given geometry.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is invalid.
pub async fn get_intersecting(
    db: &dyn Database,
    geometry: &Geometry<f64>,
) -> Result<Vec<Country>, DbError> {
    let rows = db
        .query_raw_params(
            &format!(
                "SELECT {COUNTRY_COLUMNS} FROM country \
                 WHERE ST_Intersects(geometry, ST_GeomFromText($1, 4326))"
            ),
            &[DatabaseValue::String(geometry::to_wkt_param(geometry))],
        )
        .await?;

    rows.iter().map(parse_country_row).collect()
}

/// Replaces the whole country table and records the feed timestamp,
/// atomically.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails; the transaction rolls
/// back and the previous table stays visible.
pub async fn replace_all(
    db: &dyn Database,
    countries: &[Country],
    state_doc: StateDoc,
) -> Result<(), DbError> {
    with_transaction(
        db,
        Box::pin(async move {
            db.exec_raw("TRUNCATE country").await?;
            insert_chunks(db, countries).await?;
            state::set(db, "country", state_doc).await
        }),
    )
    .await
}

async fn insert_chunks(db: &dyn Database, countries: &[Country]) -> Result<(), DbError> {
    for chunk in countries.chunks(INSERT_CHUNK) {
        let mut values = Vec::with_capacity(chunk.len());
        let mut params = Vec::with_capacity(chunk.len() * 5);

        for (i, country) in chunk.iter().enumerate() {
            let base = i * 5;
            values.push(format!(
                "(${}, ${}::jsonb, ST_GeomFromGeoJSON(${}), \
                  ST_SetSRID(ST_MakePoint(${}, ${}), 4326))",
                base + 1,
                base + 2,
                base + 3,
                base + 4,
                base + 5,
            ));
            params.push(DatabaseValue::String(country.code.clone()));
            params.push(DatabaseValue::String(encode_names(&country.names)?));
            params.push(DatabaseValue::String(geometry::to_geojson_param(
                &country.geometry,
            )?));
            params.push(DatabaseValue::Real64(country.label_position.x()));
            params.push(DatabaseValue::Real64(country.label_position.y()));
        }

        db.exec_raw_params(
            &format!(
                "INSERT INTO country (code, names, geometry, label_position) VALUES {}",
                values.join(", ")
            ),
            &params,
        )
        .await?;
    }

    Ok(())
}

fn encode_names(names: &BTreeMap<String, String>) -> Result<String, DbError> {
    serde_json::to_string(names).map_err(|e| DbError::conversion(format!("Names to JSON: {e}")))
}

/// Parses one country row from the shared column list.
fn parse_country_row(row: &Row) -> Result<Country, DbError> {
    let code: String = row
        .to_value("code")
        .map_err(|e| DbError::conversion(format!("Country code: {e}")))?;
    let names_raw: String = row
        .to_value("names")
        .map_err(|e| DbError::conversion(format!("Country {code} names: {e}")))?;
    let geometry_raw: String = row
        .to_value("geometry")
        .map_err(|e| DbError::conversion(format!("Country {code} geometry: {e}")))?;
    let label_lon: f64 = row
        .to_value("label_lon")
        .map_err(|e| DbError::conversion(format!("Country {code} label lon: {e}")))?;
    let label_lat: f64 = row
        .to_value("label_lat")
        .map_err(|e| DbError::conversion(format!("Country {code} label lat: {e}")))?;

    let names: BTreeMap<String, String> = serde_json::from_str(&names_raw)
        .map_err(|e| DbError::conversion(format!("Country {code} names JSON: {e}")))?;

    Ok(Country {
        geometry: geometry::decode_wkb_hex(&geometry_raw)?,
        label_position: Point::new(label_lon, label_lat),
        code,
        names,
    })
}
