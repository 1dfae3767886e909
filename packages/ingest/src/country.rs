//! Country table refresh.
//!
//! Downloads the country polygon bundle, assigns per-run unique codes,
//! and swaps the whole table in one transaction. A successful swap
//! triggers a full AED country-code reassignment so invariant between
//! the two tables holds again.

use std::sync::Arc;

use openaedmap_config::COUNTRY_STATE_VERSION;
use openaedmap_database::counts::CountCache;
use openaedmap_database::state::{self, StateDoc};
use openaedmap_database::{aed as aed_db, country as country_db, db};
use openaedmap_geography_models::{Country, CountryCodeAssigner, build_names};
use openaedmap_source::countries::get_osm_countries;
use switchy_database::Database;
use tokio::sync::watch;

use crate::schedule::run_task_loop;
use crate::{IngestError, now_epoch};

/// Fewer feed features than this means a broken upstream, not a shrunk
/// planet.
const MIN_FEED_FEATURES: usize = 210;

/// Long-running country refresh task; see [`run_task_loop`] for the
/// loop contract.
pub async fn update_task(
    db: Arc<dyn Database>,
    client: reqwest::Client,
    counts: Arc<CountCache>,
    started: watch::Sender<bool>,
) {
    let already_started = last_update(db.as_ref()).await > 0.0;

    run_task_loop(
        "Country update",
        openaedmap_config::country_update_delay(),
        started,
        already_started,
        || update_country_db(db.as_ref(), &client, &counts),
    )
    .await;
}

/// Runs one country refresh pass.
///
/// # Errors
///
/// Returns [`IngestError`] if the feed fetch or any database statement
/// fails; the scheduler retries with backoff.
pub async fn update_country_db(
    db: &dyn Database,
    client: &reqwest::Client,
    counts: &CountCache,
) -> Result<(), IngestError> {
    let (update_required, update_timestamp) = should_update(db).await?;
    if !update_required {
        return Ok(());
    }

    log::info!("Updating country database...");
    let features = get_osm_countries(client).await?;
    let data_timestamp = features
        .first()
        .map_or(f64::NEG_INFINITY, |feature| feature.timestamp);

    if data_timestamp <= update_timestamp {
        log::info!("Nothing to update");
        return Ok(());
    }

    if features.len() < MIN_FEED_FEATURES {
        log::warn!("Not enough countries found: {}", features.len());
        return Ok(());
    }

    let mut code_assigner = CountryCodeAssigner::new();
    let countries: Vec<Country> = features
        .iter()
        .map(|feature| Country {
            code: code_assigner.get_unique(&feature.tags),
            names: build_names(&feature.tags),
            geometry: feature.geometry.clone(),
            label_position: feature.representative_point,
        })
        .collect();

    country_db::replace_all(
        db,
        &countries,
        StateDoc::new(data_timestamp, COUNTRY_STATE_VERSION),
    )
    .await?;

    log::info!("Updating country codes");
    aed_db::assign_country_codes_all(db).await?;
    counts.invalidate_all();

    log::info!("Updating statistics");
    db::analyze(db, &["aed", "country"]).await?;

    log::info!("Country update finished ({})", countries.len());
    Ok(())
}

/// Whether a refresh is due, and the stored feed timestamp.
async fn should_update(db: &dyn Database) -> Result<(bool, f64), IngestError> {
    let Some(doc) = state::get(db, "country").await? else {
        return Ok((true, 0.0));
    };
    if doc.version < COUNTRY_STATE_VERSION {
        return Ok((true, 0.0));
    }

    let update_age = now_epoch() - doc.update_timestamp;
    if update_age > openaedmap_config::country_update_delay().as_secs_f64() {
        return Ok((true, doc.update_timestamp));
    }

    Ok((false, doc.update_timestamp))
}

/// The stored feed timestamp, `0` when absent or from an older schema.
async fn last_update(db: &dyn Database) -> f64 {
    match should_update(db).await {
        Ok((_, timestamp)) => timestamp,
        Err(_) => 0.0,
    }
}
