//! AED table queries.
//!
//! All statements are parameterized; positions travel as `ST_MakePoint`
//! bound parameters on the way in and `ST_X`/`ST_Y` projections on the
//! way out. `country_codes` is a nullable `text[]`: `NULL` means the
//! assignment pass has not run yet, `{}` means the point is over open
//! water.

use std::collections::BTreeMap;

use geo::{Geometry, Point};
use moosicbox_json_utils::database::ToValue as _;
use openaedmap_aed_models::Aed;
use switchy_database::{Database, DatabaseValue, Row};

use crate::db::{placeholders, with_transaction};
use crate::state::{self, StateDoc};
use crate::{DbError, geometry};

/// Rows per multi-row INSERT statement.
const INSERT_CHUNK: usize = 100;

/// Ids per DELETE / UPDATE statement.
const ID_CHUNK: usize = 500;

/// The shared SELECT column list for AED rows.
const AED_COLUMNS: &str = "id, version, tags::text AS tags, \
     ST_X(position) AS lon, ST_Y(position) AS lat, \
     array_to_json(country_codes)::text AS country_codes";

/// Fetches one AED by node id.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the row is invalid.
pub async fn get_by_id(db: &dyn Database, id: i64) -> Result<Option<Aed>, DbError> {
    let rows = db
        .query_raw_params(
            &format!("SELECT {AED_COLUMNS} FROM aed WHERE id = $1"),
            &[DatabaseValue::Int64(id)],
        )
        .await?;

    rows.first().map(parse_aed_row).transpose()
}

/// Fetches every AED.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is invalid.
pub async fn get_all(db: &dyn Database) -> Result<Vec<Aed>, DbError> {
    let rows = db
        .query_raw_params(&format!("SELECT {AED_COLUMNS} FROM aed"), &[])
        .await?;

    rows.iter().map(parse_aed_row).collect()
}

/// Fetches the AEDs assigned to a country code (GIN membership).
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is invalid.
pub async fn get_by_country_code(db: &dyn Database, code: &str) -> Result<Vec<Aed>, DbError> {
    let rows = db
        .query_raw_params(
            &format!("SELECT {AED_COLUMNS} FROM aed WHERE $1 = ANY(country_codes)"),
            &[DatabaseValue::String(code.to_string())],
        )
        .await?;

    rows.iter().map(parse_aed_row).collect()
}

/// Fetches the AEDs whose position intersects the given geometry.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is invalid.
pub async fn get_intersecting(
    db: &dyn Database,
    geometry: &Geometry<f64>,
) -> Result<Vec<Aed>, DbError> {
    let rows = db
        .query_raw_params(
            &format!(
                "SELECT {AED_COLUMNS} FROM aed \
                 WHERE ST_Intersects(position, ST_GeomFromText($1, 4326))"
            ),
            &[DatabaseValue::String(geometry::to_wkt_param(geometry))],
        )
        .await?;

    rows.iter().map(parse_aed_row).collect()
}

/// Counts the AEDs assigned to a country code.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn count_by_country_code(db: &dyn Database, code: &str) -> Result<u64, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT COUNT(*) AS cnt FROM aed WHERE $1 = ANY(country_codes)",
            &[DatabaseValue::String(code.to_string())],
        )
        .await?;

    let count: i64 = rows
        .first()
        .and_then(|row| row.to_value("cnt").ok())
        .unwrap_or(0);

    Ok(count.try_into().unwrap_or(0))
}

/// Replaces the whole AED table with a snapshot and records its
/// timestamp, atomically.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails; the transaction rolls
/// back and the previous corpus stays visible.
pub async fn replace_all(
    db: &dyn Database,
    aeds: &[Aed],
    state_doc: StateDoc,
) -> Result<(), DbError> {
    with_transaction(
        db,
        Box::pin(async move {
            db.exec_raw("TRUNCATE aed").await?;
            insert_chunks(db, aeds, false).await?;
            state::set(db, "aed", state_doc).await
        }),
    )
    .await
}

/// Applies one diff batch: upserts, deletes, and the state advance, in
/// one transaction.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails; the transaction rolls
/// back and the pipeline stays at the previous sequence.
pub async fn apply_diff(
    db: &dyn Database,
    upserts: &[Aed],
    delete_ids: &[i64],
    state_doc: StateDoc,
) -> Result<(), DbError> {
    with_transaction(
        db,
        Box::pin(async move {
            insert_chunks(db, upserts, true).await?;
            delete_chunks(db, delete_ids).await?;
            state::set(db, "aed", state_doc).await
        }),
    )
    .await
}

/// Recomputes `country_codes` for the given ids from the country table.
///
/// Idempotent; points matching no polygon end with an empty array.
///
/// # Errors
///
/// Returns [`DbError`] if the statement fails.
pub async fn assign_country_codes_for_ids(db: &dyn Database, ids: &[i64]) -> Result<(), DbError> {
    for chunk in ids.chunks(ID_CHUNK) {
        let params: Vec<DatabaseValue> = chunk.iter().map(|id| DatabaseValue::Int64(*id)).collect();
        db.exec_raw_params(
            &format!(
                "UPDATE aed SET country_codes = COALESCE( \
                     (SELECT array_agg(country.code) FROM country \
                      WHERE ST_Intersects(country.geometry, aed.position)), \
                     '{{}}') \
                 WHERE id IN ({})",
                placeholders(1, chunk.len())
            ),
            &params,
        )
        .await?;
    }

    Ok(())
}

/// Recomputes `country_codes` for the whole table.
///
/// # Errors
///
/// Returns [`DbError`] if the statement fails.
pub async fn assign_country_codes_all(db: &dyn Database) -> Result<(), DbError> {
    db.exec_raw(
        "UPDATE aed SET country_codes = COALESCE( \
             (SELECT array_agg(country.code) FROM country \
              WHERE ST_Intersects(country.geometry, aed.position)), \
             '{}')",
    )
    .await?;

    Ok(())
}

/// Inserts AEDs in chunks; with `upsert` the statement resolves id
/// conflicts by taking the incoming row and clearing `country_codes`.
async fn insert_chunks(db: &dyn Database, aeds: &[Aed], upsert: bool) -> Result<(), DbError> {
    for chunk in aeds.chunks(INSERT_CHUNK) {
        let mut values = Vec::with_capacity(chunk.len());
        let mut params = Vec::with_capacity(chunk.len() * 5);

        for (i, aed) in chunk.iter().enumerate() {
            let base = i * 5;
            values.push(format!(
                "(${}, ${}, ${}::jsonb, ST_SetSRID(ST_MakePoint(${}, ${}), 4326), NULL)",
                base + 1,
                base + 2,
                base + 3,
                base + 4,
                base + 5,
            ));
            params.push(DatabaseValue::Int64(aed.id));
            params.push(DatabaseValue::Int64(aed.version));
            params.push(DatabaseValue::String(encode_tags(&aed.tags)?));
            params.push(DatabaseValue::Real64(aed.position.x()));
            params.push(DatabaseValue::Real64(aed.position.y()));
        }

        let conflict = if upsert {
            " ON CONFLICT (id) DO UPDATE SET \
               version = EXCLUDED.version, \
               tags = EXCLUDED.tags, \
               position = EXCLUDED.position, \
               country_codes = NULL"
        } else {
            ""
        };

        db.exec_raw_params(
            &format!(
                "INSERT INTO aed (id, version, tags, position, country_codes) VALUES {}{conflict}",
                values.join(", ")
            ),
            &params,
        )
        .await?;
    }

    Ok(())
}

/// Deletes AEDs by id in chunks.
async fn delete_chunks(db: &dyn Database, ids: &[i64]) -> Result<(), DbError> {
    for chunk in ids.chunks(ID_CHUNK) {
        let params: Vec<DatabaseValue> = chunk.iter().map(|id| DatabaseValue::Int64(*id)).collect();
        db.exec_raw_params(
            &format!("DELETE FROM aed WHERE id IN ({})", placeholders(1, chunk.len())),
            &params,
        )
        .await?;
    }

    Ok(())
}

fn encode_tags(tags: &BTreeMap<String, String>) -> Result<String, DbError> {
    serde_json::to_string(tags).map_err(|e| DbError::conversion(format!("Tags to JSON: {e}")))
}

/// Parses one AED row from the shared column list.
fn parse_aed_row(row: &Row) -> Result<Aed, DbError> {
    let id: i64 = row
        .to_value("id")
        .map_err(|e| DbError::conversion(format!("AED id: {e}")))?;
    let version: i64 = row
        .to_value("version")
        .map_err(|e| DbError::conversion(format!("AED {id} version: {e}")))?;
    let tags_raw: String = row
        .to_value("tags")
        .map_err(|e| DbError::conversion(format!("AED {id} tags: {e}")))?;
    let lon: f64 = row
        .to_value("lon")
        .map_err(|e| DbError::conversion(format!("AED {id} lon: {e}")))?;
    let lat: f64 = row
        .to_value("lat")
        .map_err(|e| DbError::conversion(format!("AED {id} lat: {e}")))?;
    let codes_raw: Option<String> = row
        .to_value("country_codes")
        .map_err(|e| DbError::conversion(format!("AED {id} country codes: {e}")))?;

    Ok(Aed {
        id,
        version,
        tags: decode_tags(id, &tags_raw)?,
        position: Point::new(lon, lat),
        country_codes: decode_country_codes(id, codes_raw)?,
    })
}

fn decode_tags(id: i64, raw: &str) -> Result<BTreeMap<String, String>, DbError> {
    serde_json::from_str(raw).map_err(|e| DbError::conversion(format!("AED {id} tags JSON: {e}")))
}

fn decode_country_codes(id: i64, raw: Option<String>) -> Result<Option<Vec<String>>, DbError> {
    raw.map(|raw| {
        serde_json::from_str(&raw)
            .map_err(|e| DbError::conversion(format!("AED {id} country codes JSON: {e}")))
    })
    .transpose()
}
