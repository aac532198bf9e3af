//! Fleet Monitor Service: standalone binary tracking database resource health, issues and cost.
//!
//! Hosts both an RPC API and a dashboard UI on the same port.
//! Default: http://127.0.0.1:9110/

mod config;
mod cost;
mod dashboard;
mod db;
mod error;
mod health;
mod lifecycle;
mod overview;
mod resources;
mod routes;
mod seed;
mod simulator;
mod telemetry;

use config::FleetConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use routes::AppState;
use simulator::{Simulator, SimulatorStats};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = FleetConfig::from_env();

    log::info!("[FLEET_MONITOR] Opening database at: {}", config.db_path);
    let database = Arc::new(db::Db::open(&config.db_path).expect("Failed to open database"));

    if config.seed_on_start {
        let mut rng = match config.simulator_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        if let Err(e) = seed::seed_fleet(&database, &mut rng, seed::DEFAULT_FLEET_SIZE) {
            log::error!("[SEED] Failed to seed demo fleet: {}", e);
        }
    }

    let stats = Arc::new(SimulatorStats::default());
    let shutdown = CancellationToken::new();

    let state = Arc::new(AppState {
        db: database.clone(),
        start_time: Instant::now(),
        stats: stats.clone(),
        simulator_enabled: config.simulator_enabled,
        tick_interval_secs: config.tick_interval_secs,
    });

    let simulator_handle = if config.simulator_enabled {
        let sim = Simulator::new(database.clone(), config.simulator());
        let handle = tokio::spawn(simulator::run_simulator(sim, shutdown.clone(), stats.clone()));
        log::info!(
            "[FLEET_MONITOR] Simulator started (tick interval: {}s)",
            config.tick_interval_secs
        );
        Some(handle)
    } else {
        log::warn!("[FLEET_MONITOR] Simulator disabled, telemetry only changes through ingest");
        None
    };

    let cors = tower_http::cors::CorsLayer::permissive();

    let app = axum::Router::new()
        .route("/", axum::routing::get(dashboard::dashboard))
        // Resources
        .route(
            "/rpc/resources/create",
            axum::routing::post(routes::resources_create),
        )
        .route("/rpc/resources/get", axum::routing::post(routes::resources_get))
        .route(
            "/rpc/resources/delete",
            axum::routing::post(routes::resources_delete),
        )
        .route(
            "/rpc/resources/query",
            axum::routing::post(routes::resources_query),
        )
        // Metrics
        .route(
            "/rpc/metrics/ingest",
            axum::routing::post(routes::metrics_ingest),
        )
        .route(
            "/rpc/metrics/ingest_batch",
            axum::routing::post(routes::metrics_ingest_batch),
        )
        .route(
            "/rpc/metrics/series",
            axum::routing::post(routes::metrics_series),
        )
        .route(
            "/rpc/metrics/available",
            axum::routing::post(routes::metrics_available),
        )
        // Issues
        .route("/rpc/issues/create", axum::routing::post(routes::issues_create))
        .route("/rpc/issues/get", axum::routing::post(routes::issues_get))
        .route("/rpc/issues/query", axum::routing::post(routes::issues_query))
        .route("/rpc/issues/update", axum::routing::post(routes::issues_update))
        .route(
            "/rpc/issues/acknowledge",
            axum::routing::post(routes::issues_acknowledge),
        )
        .route(
            "/rpc/issues/resolve",
            axum::routing::post(routes::issues_resolve),
        )
        .route("/rpc/issues/delete", axum::routing::post(routes::issues_delete))
        .route(
            "/rpc/issues/summary",
            axum::routing::get(routes::issues_summary),
        )
        // Billing
        .route(
            "/rpc/billing/records/add",
            axum::routing::post(routes::billing_records_add),
        )
        .route(
            "/rpc/billing/records/query",
            axum::routing::post(routes::billing_records_query),
        )
        .route(
            "/rpc/billing/summary",
            axum::routing::post(routes::billing_summary),
        )
        .route(
            "/rpc/billing/breakdown",
            axum::routing::post(routes::billing_breakdown),
        )
        .route(
            "/rpc/billing/timeseries",
            axum::routing::post(routes::billing_timeseries),
        )
        .route(
            "/rpc/billing/forecast",
            axum::routing::post(routes::billing_forecast),
        )
        .route(
            "/rpc/billing/overview",
            axum::routing::post(routes::billing_overview),
        )
        // Anomalies
        .route(
            "/rpc/anomalies/query",
            axum::routing::post(routes::anomalies_query),
        )
        .route(
            "/rpc/anomalies/detect",
            axum::routing::post(routes::anomalies_detect),
        )
        .route(
            "/rpc/anomalies/acknowledge",
            axum::routing::post(routes::anomalies_acknowledge),
        )
        // Overview
        .route(
            "/rpc/overview/health",
            axum::routing::get(routes::overview_health),
        )
        .route(
            "/rpc/overview/executive",
            axum::routing::get(routes::overview_executive),
        )
        .route("/rpc/status", axum::routing::get(routes::status))
        .with_state(state)
        .layer(cors);

    let addr = format!("127.0.0.1:{}", config.port);
    log::info!("[FLEET_MONITOR] Fleet Monitor Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("[FLEET_MONITOR] Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            log::info!("[FLEET_MONITOR] Shutdown requested");
            signal.cancel();
        })
        .await
        .expect("Server error");

    shutdown.cancel();
    if let Some(handle) = simulator_handle {
        if let Err(e) = handle.await {
            log::error!("[FLEET_MONITOR] Simulator task ended abnormally: {}", e);
        }
    }
}
