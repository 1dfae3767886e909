#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the AED map.
//!
//! Serves country listings, country-scoped GeoJSON exports, per-node
//! lookups, and vector tiles from the shared `PostGIS` database.
//!
//! ## Worker roles
//!
//! Every process competes for an advisory file lock at startup. The
//! winner (primary) runs migrations, a `VACUUM ANALYZE`, and the two
//! background ingest tasks on a dedicated write connection; it flips
//! the shared state file to `running` once both tasks report their
//! first successful pass. Every other process waits for that flip
//! before binding, so no worker ever serves ahead of a usable corpus.

mod caching;
mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use openaedmap_database::counts::CountCache;
use openaedmap_database::{db, run_migrations};
use openaedmap_worker::{WorkerGuard, WorkerState};
use switchy_database::Database;
use tokio::sync::watch;

/// Shared application state.
pub struct AppState {
    /// Read connection for request handlers.
    pub db: Arc<dyn Database>,
    /// Process-local per-country count cache.
    pub counts: Arc<CountCache>,
}

/// Starts the AED map server.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind
/// or encounters a runtime error.
///
/// # Panics
///
/// Panics if the database is unreachable or worker election files
/// cannot be created; there is nothing to serve without either.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    let data_dir = openaedmap_config::data_dir();
    let worker = WorkerGuard::init(&data_dir).expect("Failed to initialize worker election");

    log::info!("Connecting to database...");
    let db_conn = db::connect_from_env()
        .await
        .expect("Failed to connect to database");
    let db: Arc<dyn Database> = Arc::from(db_conn);
    let counts = Arc::new(CountCache::new());

    if worker.is_primary() {
        start_primary(&worker, &counts).await;
    } else {
        log::info!("Waiting for the primary worker...");
        worker.wait_for_running().await;
    }

    let state = web::Data::new(AppState {
        db,
        counts,
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allowed_methods(vec!["GET"])
            .max_age(86400);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Version", openaedmap_config::VERSION)),
            )
            .app_data(state.clone())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::health))
                    .service(
                        web::scope("/v1")
                            .route(
                                "/countries/names",
                                web::get().to(handlers::country_names),
                            )
                            .route(
                                "/countries/{code}.geojson",
                                web::get().to(handlers::country_geojson),
                            )
                            .route("/node/{id}", web::get().to(handlers::node))
                            .route("/tile/{z}/{x}/{y}.mvt", web::get().to(handlers::tile)),
                    ),
            )
    })
    .bind((bind_addr, port))?
    .run();

    // The guard holds the election lock for the process lifetime.
    let _worker = worker;
    server.await
}

/// Primary-only startup: migrations, maintenance, and the two ingest
/// tasks on a dedicated write connection. Returns once both tasks have
/// reported their first successful pass and the state gate is flipped.
async fn start_primary(worker: &WorkerGuard, counts: &Arc<CountCache>) {
    log::info!("Running migrations...");
    let write_conn = db::connect_from_env()
        .await
        .expect("Failed to open the write connection");
    let write_db: Arc<dyn Database> = Arc::from(write_conn);

    run_migrations(write_db.as_ref())
        .await
        .expect("Failed to run migrations");

    log::info!("Running startup maintenance...");
    db::vacuum_analyze(write_db.as_ref())
        .await
        .expect("Failed to vacuum the database");

    let client = openaedmap_source::build_http_client(openaedmap_config::HTTP_TIMEOUT)
        .expect("Failed to build the upstream HTTP client");

    let (country_started, mut country_ready) = watch::channel(false);
    let (aed_started, mut aed_ready) = watch::channel(false);

    tokio::spawn(openaedmap_ingest::country::update_task(
        Arc::clone(&write_db),
        client.clone(),
        Arc::clone(counts),
        country_started,
    ));
    tokio::spawn(openaedmap_ingest::aed::update_task(
        write_db,
        client,
        Arc::clone(counts),
        aed_started,
    ));

    log::info!("Waiting for the first ingest passes...");
    openaedmap_ingest::schedule::wait_started(&mut country_ready).await;
    openaedmap_ingest::schedule::wait_started(&mut aed_ready).await;

    worker
        .set_state(WorkerState::Running)
        .expect("Failed to flip the worker state");
}
