//! Axum route handlers for the fleet monitor RPC API.

use crate::cost;
use crate::db::{self, Db};
use crate::error::{FleetError, FleetResult};
use crate::lifecycle;
use crate::overview;
use crate::resources;
use crate::simulator::SimulatorStats;
use crate::telemetry;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use fleet_monitor_types::*;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

pub struct AppState {
    pub db: Arc<Db>,
    pub start_time: Instant,
    pub stats: Arc<SimulatorStats>,
    pub simulator_enabled: bool,
    pub tick_interval_secs: u64,
}

type RpcReply<T> = (StatusCode, Json<RpcResponse<T>>);

pub fn status_for(err: &FleetError) -> StatusCode {
    match err {
        FleetError::NotFound { .. } => StatusCode::NOT_FOUND,
        FleetError::InvalidTransition { .. } | FleetError::AlreadyResolved { .. } => StatusCode::CONFLICT,
        FleetError::Validation(_) => StatusCode::BAD_REQUEST,
        FleetError::Conflict(_) => StatusCode::CONFLICT,
        FleetError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T: Serialize>(result: FleetResult<T>) -> RpcReply<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(RpcResponse::ok(data))),
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                log::error!("[FLEET_MONITOR] {}", e);
            }
            (status, Json(RpcResponse::err(e.to_string())))
        }
    }
}

fn window_of(req: &WindowRequest) -> FleetResult<CostWindow> {
    cost::resolve_window(req, Utc::now().date_naive())
}

// =====================================================
// Resource Endpoints
// =====================================================

// POST /rpc/resources/create
pub async fn resources_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewResource>,
) -> RpcReply<Resource> {
    reply(resources::create_resource(&state.db, &req))
}

// POST /rpc/resources/get
pub async fn resources_get(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdRequest>,
) -> RpcReply<Resource> {
    reply(resources::get_resource(&state.db, req.id))
}

// POST /rpc/resources/delete
pub async fn resources_delete(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdRequest>,
) -> RpcReply<bool> {
    reply(resources::delete_resource(&state.db, req.id).map(|_| true))
}

// POST /rpc/resources/query
pub async fn resources_query(
    State(state): State<Arc<AppState>>,
    Json(filter): Json<ResourceFilter>,
) -> RpcReply<Vec<Resource>> {
    reply(resources::list_resources(&state.db, &filter))
}

// =====================================================
// Metric Endpoints
// =====================================================

// POST /rpc/metrics/ingest
pub async fn metrics_ingest(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestMetricRequest>,
) -> RpcReply<MetricSample> {
    reply(telemetry::ingest_metric(&state.db, &req))
}

// POST /rpc/metrics/ingest_batch
pub async fn metrics_ingest_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestBatchRequest>,
) -> RpcReply<BatchIngestResult> {
    reply(telemetry::ingest_batch(&state.db, &req))
}

// POST /rpc/metrics/series
pub async fn metrics_series(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MetricSeriesRequest>,
) -> RpcReply<MetricSeries> {
    reply(telemetry::metric_series(&state.db, &req))
}

// POST /rpc/metrics/available
pub async fn metrics_available(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResourceIdRequest>,
) -> RpcReply<Vec<String>> {
    reply(telemetry::available_metrics(&state.db, req.resource_id))
}

// =====================================================
// Issue Endpoints
// =====================================================

// POST /rpc/issues/create
pub async fn issues_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateIssueRequest>,
) -> RpcReply<IssueDetection> {
    reply(lifecycle::create_or_bump(&state.db, req.resource_id, &req.template))
}

// POST /rpc/issues/get
pub async fn issues_get(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdRequest>,
) -> RpcReply<Issue> {
    reply(lifecycle::get_issue(&state.db, req.id))
}

// POST /rpc/issues/query
pub async fn issues_query(
    State(state): State<Arc<AppState>>,
    Json(filter): Json<IssueFilter>,
) -> RpcReply<Vec<Issue>> {
    reply(lifecycle::list_issues(&state.db, &filter))
}

// POST /rpc/issues/update
pub async fn issues_update(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateIssueRequest>,
) -> RpcReply<Issue> {
    reply(lifecycle::update(&state.db, req.id, &req.update))
}

// POST /rpc/issues/acknowledge
pub async fn issues_acknowledge(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActorRequest>,
) -> RpcReply<Issue> {
    reply(lifecycle::acknowledge(&state.db, req.id, &req.actor))
}

// POST /rpc/issues/resolve
pub async fn issues_resolve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActorRequest>,
) -> RpcReply<Issue> {
    reply(lifecycle::resolve(&state.db, req.id, &req.actor))
}

// POST /rpc/issues/delete
pub async fn issues_delete(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdRequest>,
) -> RpcReply<bool> {
    reply(lifecycle::delete(&state.db, req.id).map(|_| true))
}

// GET /rpc/issues/summary
pub async fn issues_summary(State(state): State<Arc<AppState>>) -> RpcReply<IssueSummary> {
    reply(lifecycle::issue_summary(&state.db))
}

// =====================================================
// Billing Endpoints
// =====================================================

// POST /rpc/billing/records/add
pub async fn billing_records_add(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewBillingRecord>,
) -> RpcReply<BillingRecord> {
    reply(cost::add_billing_record(&state.db, &req))
}

// POST /rpc/billing/records/query
pub async fn billing_records_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BillingRecordQuery>,
) -> RpcReply<Vec<BillingRecord>> {
    reply(window_of(&req.window).and_then(|w| cost::list_billing_records(&state.db, req.resource_id, &w)))
}

// POST /rpc/billing/summary
pub async fn billing_summary(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WindowRequest>,
) -> RpcReply<CostSummary> {
    reply(window_of(&req).and_then(|w| cost::summary(&state.db, &w)))
}

// POST /rpc/billing/breakdown
pub async fn billing_breakdown(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BreakdownRequest>,
) -> RpcReply<Vec<CostGroup>> {
    reply(window_of(&req.window).and_then(|w| cost::breakdown(&state.db, req.group_by, &w)))
}

// POST /rpc/billing/timeseries
pub async fn billing_timeseries(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WindowRequest>,
) -> RpcReply<Vec<CostPoint>> {
    reply(window_of(&req).and_then(|w| cost::time_series(&state.db, &w)))
}

// POST /rpc/billing/forecast
pub async fn billing_forecast(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WindowRequest>,
) -> RpcReply<CostForecast> {
    reply(window_of(&req).and_then(|w| cost::forecast_next_period(&state.db, &w)))
}

// POST /rpc/billing/overview
pub async fn billing_overview(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WindowRequest>,
) -> RpcReply<BillingOverview> {
    reply(window_of(&req).and_then(|w| cost::billing_overview(&state.db, &w)))
}

// =====================================================
// Anomaly Endpoints
// =====================================================

// POST /rpc/anomalies/query
pub async fn anomalies_query(
    State(state): State<Arc<AppState>>,
    Json(filter): Json<AnomalyFilter>,
) -> RpcReply<Vec<CostAnomaly>> {
    reply(cost::list_anomalies(&state.db, &filter))
}

// POST /rpc/anomalies/detect
pub async fn anomalies_detect(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DetectAnomalyRequest>,
) -> RpcReply<CostAnomaly> {
    reply(cost::detect_anomaly(&state.db, req.resource_id, req.amount, req.anomaly_type))
}

// POST /rpc/anomalies/acknowledge
pub async fn anomalies_acknowledge(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActorRequest>,
) -> RpcReply<CostAnomaly> {
    reply(cost::acknowledge_anomaly(&state.db, req.id, &req.actor))
}

// =====================================================
// Overview Endpoints
// =====================================================

// GET /rpc/overview/health
pub async fn overview_health(State(state): State<Arc<AppState>>) -> RpcReply<HealthSummary> {
    reply(overview::health_summary(&state.db))
}

// GET /rpc/overview/executive
pub async fn overview_executive(State(state): State<Arc<AppState>>) -> RpcReply<ExecutiveSummary> {
    reply(overview::executive_summary(&state.db))
}

// GET /rpc/status
pub async fn status(State(state): State<Arc<AppState>>) -> RpcReply<ServiceStatus> {
    let counts = state.db.read(|conn| {
        Ok((
            db::resources::count(conn)?,
            db::issues::count_where(conn, IssueStatus::Active, None)?
                + db::issues::count_where(conn, IssueStatus::Acknowledged, None)?,
            db::anomalies::count_unacknowledged(conn)?,
        ))
    });
    let last_tick_at = state.stats.last_tick_at.lock().await.clone();

    reply(counts.map(|(total_resources, open_issues, unacknowledged_anomalies)| ServiceStatus {
        running: true,
        uptime_secs: state.start_time.elapsed().as_secs(),
        total_resources,
        open_issues,
        unacknowledged_anomalies,
        simulator_enabled: state.simulator_enabled,
        ticks_completed: state.stats.ticks_completed.load(Ordering::Relaxed),
        last_tick_at,
        tick_interval_secs: state.tick_interval_secs,
    }))
}
