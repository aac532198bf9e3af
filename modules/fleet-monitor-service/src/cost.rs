//! Cost analytics: window summaries, breakdowns, daily series, a naive forecast, and anomaly
//! scoring and bookkeeping.
//!
//! Windows are inclusive `[start, end]` calendar days whose length is `end - start` in days.
//! Deciding *when* an anomaly happened is an [`AnomalyTrigger`]'s job; this module only scores
//! and stores what a trigger reports.

use crate::db::{self, Db};
use crate::error::{FleetError, FleetResult};
use crate::health::round2;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use fleet_monitor_types::*;
use rusqlite::Connection;

/// Window used when a request names neither bound.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;
/// Days projected by the forecast and used to derive a daily baseline from a monthly cost.
pub const DAYS_PER_MONTH: f64 = 30.0;
/// Attached to every forecast; not computed.
pub const FORECAST_CONFIDENCE: f64 = 0.75;
/// Allowed gap between a record's components and its total.
pub const COMPONENT_TOLERANCE: f64 = 0.01;
const OVERVIEW_ANOMALY_LIMIT: i64 = 10;

// =====================================================
// Pure helpers
// =====================================================

/// Fill missing bounds: `end` defaults to `today`, `start` to 30 days before `end`.
pub fn resolve_window(req: &WindowRequest, today: NaiveDate) -> FleetResult<CostWindow> {
    let end = req.end_date.unwrap_or(today);
    let start = req.start_date.unwrap_or(end - Duration::days(DEFAULT_WINDOW_DAYS));
    if start > end {
        return Err(FleetError::validation(format!(
            "start_date {} is after end_date {}",
            start, end
        )));
    }
    Ok(CostWindow::new(start, end))
}

/// Relative change in percent; 0 when there is no positive previous value.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous <= 0.0 {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

/// `part` as a percentage of `total`; 0 when `total` is not positive.
pub fn share_percent(part: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    part / total * 100.0
}

/// Average daily spend over the window, projected over a month.
pub fn forecast(window_total: f64, window: &CostWindow) -> CostForecast {
    let days = window.length_days();
    let avg_daily = if days > 0 { window_total / days as f64 } else { 0.0 };
    CostForecast {
        window_days: days,
        avg_daily,
        forecast_next_month: avg_daily * DAYS_PER_MONTH,
        confidence: FORECAST_CONFIDENCE,
    }
}

// =====================================================
// Window analytics
// =====================================================

pub fn summary(db: &Db, window: &CostWindow) -> FleetResult<CostSummary> {
    db.read(|conn| summary_in(conn, window))
}

fn summary_in(conn: &Connection, window: &CostWindow) -> FleetResult<CostSummary> {
    let total_cost = db::billing::total_in(conn, window)?;
    let previous_period_cost = db::billing::total_in(conn, &window.previous())?;
    let breakdown = db::billing::components_in(conn, window)?;
    let projected = forecast(total_cost, window);
    Ok(CostSummary {
        total_cost,
        previous_period_cost,
        cost_change_percent: percent_change(total_cost, previous_period_cost),
        breakdown,
        forecast_next_month: projected.forecast_next_month,
        forecast_confidence: projected.confidence,
    })
}

pub fn breakdown(db: &Db, key: BreakdownKey, window: &CostWindow) -> FleetResult<Vec<CostGroup>> {
    db.read(|conn| breakdown_in(conn, key, window))
}

fn breakdown_in(conn: &Connection, key: BreakdownKey, window: &CostWindow) -> FleetResult<Vec<CostGroup>> {
    let current_total = db::billing::total_in(conn, window)?;
    Ok(db::billing::grouped_totals(conn, key, window)?
        .into_iter()
        .map(|(key, total_cost, resource_count)| CostGroup {
            key,
            total_cost,
            resource_count,
            percentage: share_percent(total_cost, current_total),
        })
        .collect())
}

/// One point per day that has records. Days without records are absent, not zero.
pub fn time_series(db: &Db, window: &CostWindow) -> FleetResult<Vec<CostPoint>> {
    db.read(|conn| time_series_in(conn, window))
}

fn time_series_in(conn: &Connection, window: &CostWindow) -> FleetResult<Vec<CostPoint>> {
    Ok(db::billing::daily_totals(conn, window)?
        .into_iter()
        .map(|(date, total_cost)| CostPoint { date, total_cost })
        .collect())
}

pub fn forecast_next_period(db: &Db, window: &CostWindow) -> FleetResult<CostForecast> {
    let total = db.read(|conn| Ok(db::billing::total_in(conn, window)?))?;
    Ok(forecast(total, window))
}

/// Summary, all three breakdowns, the daily series and recent anomalies in one read.
pub fn billing_overview(db: &Db, window: &CostWindow) -> FleetResult<BillingOverview> {
    db.read(|conn| {
        let since = window.start.and_time(NaiveTime::MIN).and_utc();
        Ok(BillingOverview {
            window: *window,
            summary: summary_in(conn, window)?,
            by_cloud: breakdown_in(conn, BreakdownKey::Cloud, window)?,
            by_type: breakdown_in(conn, BreakdownKey::Type, window)?,
            by_region: breakdown_in(conn, BreakdownKey::Region, window)?,
            time_series: time_series_in(conn, window)?,
            anomalies: db::anomalies::detected_since(conn, since, OVERVIEW_ANOMALY_LIMIT)?,
        })
    })
}

// =====================================================
// Billing records
// =====================================================

/// Store one day of cost for a resource, replacing any record for the same day.
/// The resource's monthly cost is re-estimated from this record.
pub fn add_billing_record(db: &Db, record: &NewBillingRecord) -> FleetResult<BillingRecord> {
    validate_billing_record(record)?;
    db.transaction(|tx| add_billing_record_in(tx, record, Utc::now()))
}

fn add_billing_record_in(
    conn: &Connection,
    record: &NewBillingRecord,
    now: DateTime<Utc>,
) -> FleetResult<BillingRecord> {
    db::resources::require(conn, record.resource_id)?;
    let id = db::billing::upsert(conn, record, now)?;
    db::resources::set_monthly_cost(conn, record.resource_id, record.total_cost * DAYS_PER_MONTH, now)?;
    db::billing::get(conn, id)?.ok_or_else(|| FleetError::not_found("BillingRecord", id))
}

pub fn list_billing_records(db: &Db, resource_id: i64, window: &CostWindow) -> FleetResult<Vec<BillingRecord>> {
    db.read(|conn| {
        db::resources::require(conn, resource_id)?;
        Ok(db::billing::list_for_resource(conn, resource_id, window)?)
    })
}

fn validate_billing_record(record: &NewBillingRecord) -> FleetResult<()> {
    let c = &record.components;
    for (field, value) in [
        ("total_cost", record.total_cost),
        ("compute", c.compute),
        ("storage", c.storage),
        ("backup", c.backup),
        ("data_transfer", c.data_transfer),
        ("other", c.other),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(FleetError::validation(format!(
                "{} must be a non-negative amount, got {}",
                field, value
            )));
        }
    }
    let parts = c.sum();
    if parts > 0.0 && (parts - record.total_cost).abs() > COMPONENT_TOLERANCE {
        return Err(FleetError::validation(format!(
            "components sum to {:.2} but total_cost is {:.2}",
            parts, record.total_cost
        )));
    }
    if record.currency.trim().is_empty() {
        return Err(FleetError::validation("currency must not be empty"));
    }
    Ok(())
}

// =====================================================
// Anomalies
// =====================================================

/// What a trigger reports when it decides an anomaly occurred.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalySignal {
    pub anomaly_type: CostAnomalyType,
    pub amount: f64,
}

/// Decides when a resource's spend is anomalous. Scoring and storage stay in this module.
pub trait AnomalyTrigger {
    fn evaluate(&mut self, resource: &Resource) -> Option<AnomalySignal>;
}

pub fn explanation_for(anomaly_type: CostAnomalyType) -> &'static str {
    match anomaly_type {
        CostAnomalyType::Spike => {
            "Sudden cost increase detected, likely due to traffic surge or resource scaling."
        }
        CostAnomalyType::SustainedIncrease => {
            "Costs have been trending upward over the past several days."
        }
        CostAnomalyType::UnexpectedCharge => {
            "Unexpected charge detected that doesn't match normal patterns."
        }
    }
}

const POSSIBLE_CAUSES: [&str; 3] = ["Increased usage", "Scaling event", "Configuration change"];

/// Score an observed daily amount against the monthly cost's daily baseline.
pub fn score_anomaly(
    resource_id: Option<i64>,
    monthly_cost: f64,
    amount: f64,
    anomaly_type: CostAnomalyType,
) -> NewCostAnomaly {
    let baseline = monthly_cost / DAYS_PER_MONTH;
    let deviation = if baseline > 0.0 {
        (amount - baseline) / baseline * 100.0
    } else {
        0.0
    };
    NewCostAnomaly {
        resource_id,
        anomaly_type,
        amount: round2(amount),
        baseline_amount: round2(baseline),
        deviation_percent: round2(deviation),
        explanation: Some(explanation_for(anomaly_type).to_string()),
        possible_causes: POSSIBLE_CAUSES.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn detect_anomaly(
    db: &Db,
    resource_id: i64,
    amount: f64,
    anomaly_type: CostAnomalyType,
) -> FleetResult<CostAnomaly> {
    db.transaction(|tx| detect_anomaly_in(tx, resource_id, amount, anomaly_type, Utc::now()))
}

pub(crate) fn detect_anomaly_in(
    conn: &Connection,
    resource_id: i64,
    amount: f64,
    anomaly_type: CostAnomalyType,
    now: DateTime<Utc>,
) -> FleetResult<CostAnomaly> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(FleetError::validation(format!(
            "amount must be a non-negative number, got {}",
            amount
        )));
    }
    let resource = db::resources::require(conn, resource_id)?;
    let scored = score_anomaly(Some(resource.id), resource.monthly_cost, amount, anomaly_type);
    let id = db::anomalies::insert(conn, &scored, now)?;
    require_anomaly(conn, id)
}

pub fn list_anomalies(db: &Db, filter: &AnomalyFilter) -> FleetResult<Vec<CostAnomaly>> {
    db.read(|conn| Ok(db::anomalies::query(conn, filter)?))
}

/// One-way acknowledgement. The first actor is kept; repeating it is a successful no-op.
pub fn acknowledge_anomaly(db: &Db, id: i64, actor: &str) -> FleetResult<CostAnomaly> {
    if actor.trim().is_empty() {
        return Err(FleetError::validation("actor must not be empty"));
    }
    db.transaction(|tx| {
        require_anomaly(tx, id)?;
        db::anomalies::acknowledge_once(tx, id, actor, Utc::now())?;
        require_anomaly(tx, id)
    })
}

fn require_anomaly(conn: &Connection, id: i64) -> FleetResult<CostAnomaly> {
    db::anomalies::get(conn, id)?.ok_or_else(|| FleetError::not_found("Anomaly", id))
}
