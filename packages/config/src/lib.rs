#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Product constants and environment-derived settings.
//!
//! Every tunable lives here: upstream endpoints, scheduler delays, tile
//! zoom bounds, and HTTP cache ages. Environment variables override the
//! defaults; durations are accepted as plain numbers (days for the
//! country refresh, seconds for everything else).

use std::path::PathBuf;
use std::time::Duration;

/// Product name, used in the `User-Agent` and the `X-Version` header.
pub const NAME: &str = "openaedmap-backend";

/// Product version from the workspace build.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Public project website, advertised in the `User-Agent`.
pub const WEBSITE: &str = "https://openaedmap.org";

/// `User-Agent` presented on all upstream HTTP traffic.
pub const USER_AGENT: &str = concat!(
    "openaedmap-backend/",
    env!("CARGO_PKG_VERSION"),
    " (+https://openaedmap.org)"
);

/// Connect timeout for upstream HTTP requests.
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Total timeout for upstream HTTP requests (bulk snapshot excepted).
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Server-side and client-side timeout for the Overpass bulk snapshot.
pub const OVERPASS_TIMEOUT: Duration = Duration::from_secs(3600);

/// Upper bound for the whole multi-file replication diff pull.
pub const PLANET_DIFF_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Ceiling for exponential-backoff sleeps.
pub const RETRY_MAX_SLEEP: Duration = Duration::from_secs(4 * 3600);

/// Inter-run delay of the AED update task.
pub const AED_UPDATE_DELAY_DEFAULT: Duration = Duration::from_secs(30);

/// Snapshot-vs-diff cutoff: data older than this is rebuilt from Overpass.
pub const AED_REBUILD_THRESHOLD_DEFAULT: Duration = Duration::from_secs(3600);

/// Inter-run delay of the country refresh task.
pub const COUNTRY_UPDATE_DELAY_DEFAULT: Duration = Duration::from_secs(24 * 3600);

/// Schema version of the `aed` state document.
pub const AED_STATE_VERSION: i64 = 3;

/// Schema version of the `country` state document.
pub const COUNTRY_STATE_VERSION: i64 = 2;

/// Minimum zoom served by the tile endpoint.
pub const TILE_MIN_Z: u32 = 3;

/// Maximum zoom served by the tile endpoint; clustering is disabled here.
pub const TILE_MAX_Z: u32 = 16;

/// Highest zoom that still renders country polygons instead of AEDs.
pub const TILE_COUNTRIES_MAX_Z: u32 = 5;

/// Coordinate extent of an encoded vector tile.
pub const MVT_EXTENT: u32 = 4096;

/// Cache age for AED tiles and node lookups.
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(60);

/// Stale window for node lookups.
pub const DEFAULT_CACHE_STALE: Duration = Duration::from_secs(5 * 60);

/// Cache age for country tiles.
pub const TILE_COUNTRIES_CACHE_MAX_AGE: Duration = Duration::from_secs(4 * 3600);

/// Stale window for country tiles.
pub const TILE_COUNTRIES_CACHE_STALE: Duration = Duration::from_secs(7 * 24 * 3600);

/// Stale window for AED tiles.
pub const TILE_AEDS_CACHE_STALE: Duration = Duration::from_secs(3 * 24 * 3600);

/// Cache age for the country names listing and country GeoJSON exports.
pub const COUNTRY_CACHE_MAX_AGE: Duration = Duration::from_secs(3600);

/// Stale window for the country names listing.
pub const COUNTRY_NAMES_CACHE_STALE: Duration = Duration::from_secs(7 * 24 * 3600);

/// Default Overpass interpreter endpoint.
const OVERPASS_API_URL_DEFAULT: &str = "https://overpass-api.de/api/interpreter";

/// Default minute-grain replication base URL.
const REPLICATION_URL_DEFAULT: &str = "https://planet.openstreetmap.org/replication/minute/";

/// Default zstd-compressed country polygon bundle.
const COUNTRY_GEOJSON_URL_DEFAULT: &str =
    "https://osm-countries-geojson.monicz.dev/osm-countries-0-01.geojson.zst";

/// Overpass interpreter endpoint (`OVERPASS_API_URL`).
#[must_use]
pub fn overpass_api_url() -> String {
    std::env::var("OVERPASS_API_URL").unwrap_or_else(|_| OVERPASS_API_URL_DEFAULT.to_string())
}

/// Replication base URL (`REPLICATION_URL`), always slash-terminated.
#[must_use]
pub fn replication_url() -> String {
    let url = std::env::var("REPLICATION_URL").unwrap_or_else(|_| REPLICATION_URL_DEFAULT.to_string());
    if url.ends_with('/') { url } else { format!("{url}/") }
}

/// Country polygon feed URL (`COUNTRY_GEOJSON_URL`).
#[must_use]
pub fn country_geojson_url() -> String {
    std::env::var("COUNTRY_GEOJSON_URL").unwrap_or_else(|_| COUNTRY_GEOJSON_URL_DEFAULT.to_string())
}

/// Directory holding the worker lock, PID, and state files (`DATA_DIR`).
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var("DATA_DIR").map_or_else(|_| PathBuf::from("data"), PathBuf::from)
}

/// Inter-run delay of the AED update task (`AED_UPDATE_DELAY`, seconds).
#[must_use]
pub fn aed_update_delay() -> Duration {
    env_duration_secs("AED_UPDATE_DELAY", AED_UPDATE_DELAY_DEFAULT)
}

/// Snapshot cutoff (`AED_REBUILD_THRESHOLD`, seconds).
#[must_use]
pub fn aed_rebuild_threshold() -> Duration {
    env_duration_secs("AED_REBUILD_THRESHOLD", AED_REBUILD_THRESHOLD_DEFAULT)
}

/// Inter-run delay of the country refresh task
/// (`COUNTRY_UPDATE_DELAY`, days, fractional values allowed).
#[must_use]
pub fn country_update_delay() -> Duration {
    match std::env::var("COUNTRY_UPDATE_DELAY") {
        Ok(raw) => raw.trim().parse::<f64>().map_or_else(
            |_| {
                log::warn!("Ignoring unparsable COUNTRY_UPDATE_DELAY: {raw:?}");
                COUNTRY_UPDATE_DELAY_DEFAULT
            },
            |days| Duration::from_secs_f64(days * 24.0 * 3600.0),
        ),
        Err(_) => COUNTRY_UPDATE_DELAY_DEFAULT,
    }
}

/// Reads a whole-seconds duration from the environment.
fn env_duration_secs(var: &str, default: Duration) -> Duration {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse::<u64>().map_or_else(
            |_| {
                log::warn!("Ignoring unparsable {var}: {raw:?}");
                default
            },
            Duration::from_secs,
        ),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_name_and_website() {
        assert!(USER_AGENT.starts_with("openaedmap-backend/"));
        assert!(USER_AGENT.ends_with("(+https://openaedmap.org)"));
    }

    #[test]
    fn replication_url_is_slash_terminated() {
        assert!(replication_url().ends_with('/'));
    }

    #[test]
    fn default_delays_are_sane() {
        assert!(AED_UPDATE_DELAY_DEFAULT < AED_REBUILD_THRESHOLD_DEFAULT);
        assert!(AED_REBUILD_THRESHOLD_DEFAULT < COUNTRY_UPDATE_DELAY_DEFAULT);
    }
}
