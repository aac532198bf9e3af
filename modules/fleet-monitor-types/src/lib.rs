//! Shared types for the fleet monitor service and its RPC clients.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Lowest score that still counts as healthy.
pub const HEALTHY_MIN_SCORE: f64 = 80.0;
/// Lowest score that counts as warning; anything below is critical.
pub const WARNING_MIN_SCORE: f64 = 50.0;

// =====================================================
// Classification Enums
// =====================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EngineType {
    Postgres,
    Mysql,
    Mongodb,
    Redis,
    Dynamodb,
    Aurora,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

/// Three-way bucket derived from a health score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    /// `>= 80` healthy, `>= 50` warning, otherwise critical.
    pub fn from_score(score: f64) -> Self {
        if score >= HEALTHY_MIN_SCORE {
            HealthStatus::Healthy
        } else if score >= WARNING_MIN_SCORE {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueSeverity {
    Critical,
    Warning,
    Info,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueCategory {
    Performance,
    Capacity,
    Availability,
    Configuration,
    Cost,
    Security,
}

/// Lifecycle status of an issue.
///
/// `Active -> Acknowledged -> Resolved`, or `Active -> Resolved` directly.
/// `Resolved` is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl IssueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IssueStatus::Resolved)
    }

    /// Whether an issue in this status counts towards a resource's `active_issue_count`.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: IssueStatus) -> bool {
        matches!(
            (self, next),
            (IssueStatus::Active, IssueStatus::Acknowledged)
                | (IssueStatus::Active, IssueStatus::Resolved)
                | (IssueStatus::Acknowledged, IssueStatus::Resolved)
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CostAnomalyType {
    Spike,
    SustainedIncrease,
    UnexpectedCharge,
}

/// Kind of operational change applied to a resource.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeType {
    Deployment,
    ConfigChange,
    Scaling,
    Migration,
    Maintenance,
    VersionUpgrade,
    Failover,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeImpact {
    Low,
    Medium,
    High,
}

/// Resource attribute a cost breakdown groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BreakdownKey {
    Cloud,
    Type,
    Region,
}

/// Look-back window for metric time series queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MetricWindow {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl MetricWindow {
    pub fn duration(&self) -> Duration {
        match self {
            MetricWindow::OneHour => Duration::hours(1),
            MetricWindow::SixHours => Duration::hours(6),
            MetricWindow::Day => Duration::hours(24),
            MetricWindow::Week => Duration::days(7),
            MetricWindow::Month => Duration::days(30),
        }
    }
}

// =====================================================
// Resources
// =====================================================

/// Current telemetry of a resource, the input to health scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub storage_usage: f64,
    pub connections_active: i64,
    pub connections_max: i64,
}

/// A monitored database instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub name: String,
    pub engine: EngineType,
    pub cloud_provider: CloudProvider,
    pub region: String,
    pub environment: Environment,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub storage_usage: f64,
    pub connections_active: i64,
    pub connections_max: i64,
    pub health_score: f64,
    pub health_status: HealthStatus,
    pub monthly_cost: f64,
    pub cost_trend: f64,
    pub version: Option<String>,
    pub instance_type: Option<String>,
    pub storage_size_gb: Option<i64>,
    pub active_issue_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Resource {
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cpu_usage: self.cpu_usage,
            memory_usage: self.memory_usage,
            storage_usage: self.storage_usage,
            connections_active: self.connections_active,
            connections_max: self.connections_max,
        }
    }
}

fn default_connections_max() -> i64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResource {
    pub name: String,
    pub engine: EngineType,
    pub cloud_provider: CloudProvider,
    pub region: String,
    pub environment: Environment,
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub storage_usage: f64,
    #[serde(default)]
    pub connections_active: i64,
    #[serde(default = "default_connections_max")]
    pub connections_max: i64,
    #[serde(default)]
    pub monthly_cost: f64,
    #[serde(default)]
    pub cost_trend: f64,
    pub version: Option<String>,
    pub instance_type: Option<String>,
    pub storage_size_gb: Option<i64>,
}

/// Filters for listing resources
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub cloud_provider: Option<CloudProvider>,
    pub engine: Option<EngineType>,
    pub environment: Option<Environment>,
    pub health_status: Option<HealthStatus>,
    pub region: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

// =====================================================
// Issues
// =====================================================

/// A detected operational problem on one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub resource_id: i64,
    pub title: String,
    pub description: String,
    pub severity: IssueSeverity,
    pub category: IssueCategory,
    pub status: IssueStatus,
    pub ai_explanation: Option<String>,
    pub ai_recommendations: Vec<String>,
    pub occurrence_count: i64,
    pub first_detected_at: DateTime<Utc>,
    pub last_detected_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a detection reports; (resource, title) is the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTemplate {
    pub title: String,
    pub description: String,
    pub severity: IssueSeverity,
    pub category: IssueCategory,
    pub ai_explanation: Option<String>,
    #[serde(default)]
    pub ai_recommendations: Vec<String>,
}

/// Outcome of a detection: either a newly opened issue or a bumped existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueDetection {
    pub issue: Issue,
    pub created: bool,
}

/// Filters for querying issues
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IssueFilter {
    pub severity: Option<IssueSeverity>,
    pub category: Option<IssueCategory>,
    pub status: Option<IssueStatus>,
    pub resource_id: Option<i64>,
    pub limit: Option<usize>,
}

/// Editable issue fields. A status change follows the lifecycle rules.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IssueUpdate {
    pub description: Option<String>,
    pub ai_explanation: Option<String>,
    pub ai_recommendations: Option<Vec<String>>,
    pub status: Option<IssueStatus>,
    pub actor: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IssueSummary {
    pub total_issues: i64,
    pub critical_count: i64,
    pub warning_count: i64,
    pub info_count: i64,
    pub active_count: i64,
    pub acknowledged_count: i64,
    pub resolved_count: i64,
    pub by_category: BTreeMap<String, i64>,
}

/// A resource whose stored counter disagrees with its open issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDrift {
    pub resource_id: i64,
    pub stored: i64,
    pub actual: i64,
}

// =====================================================
// Billing
// =====================================================

/// Per-component costs of a billing period
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostComponents {
    pub compute: f64,
    pub storage: f64,
    pub backup: f64,
    pub data_transfer: f64,
    pub other: f64,
}

impl CostComponents {
    pub fn sum(&self) -> f64 {
        self.compute + self.storage + self.backup + self.data_transfer + self.other
    }
}

/// One day of cost for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRecord {
    pub id: i64,
    pub resource_id: i64,
    pub billing_date: NaiveDate,
    pub total_cost: f64,
    pub components: CostComponents,
    pub currency: String,
    pub billing_source: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBillingRecord {
    pub resource_id: i64,
    pub billing_date: NaiveDate,
    pub total_cost: f64,
    #[serde(default)]
    pub components: CostComponents,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub billing_source: Option<String>,
}

/// Inclusive calendar-day window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CostWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `days`-long window ending on `end`.
    pub fn ending_on(end: NaiveDate, days: i64) -> Self {
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    /// `end - start` in days. An inclusive Jan 1..Jan 11 window has length 10.
    pub fn length_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Same-length window ending the day before `start`.
    pub fn previous(&self) -> Self {
        let end = self.start - Duration::days(1);
        Self {
            start: end - Duration::days(self.length_days()),
            end,
        }
    }
}

/// Optional window bounds; missing ones default to the last 30 days.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WindowRequest {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BillingRecordQuery {
    pub resource_id: i64,
    #[serde(flatten)]
    pub window: WindowRequest,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BreakdownRequest {
    #[serde(flatten)]
    pub window: WindowRequest,
    pub group_by: BreakdownKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_cost: f64,
    pub previous_period_cost: f64,
    pub cost_change_percent: f64,
    pub breakdown: CostComponents,
    pub forecast_next_month: f64,
    pub forecast_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostGroup {
    pub key: String,
    pub total_cost: f64,
    pub resource_count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostPoint {
    pub date: NaiveDate,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostForecast {
    pub window_days: i64,
    pub avg_daily: f64,
    pub forecast_next_month: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingOverview {
    pub window: CostWindow,
    pub summary: CostSummary,
    pub by_cloud: Vec<CostGroup>,
    pub by_type: Vec<CostGroup>,
    pub by_region: Vec<CostGroup>,
    pub time_series: Vec<CostPoint>,
    pub anomalies: Vec<CostAnomaly>,
}

// =====================================================
// Cost Anomalies
// =====================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostAnomaly {
    pub id: i64,
    pub resource_id: Option<i64>,
    pub anomaly_type: CostAnomalyType,
    pub amount: f64,
    pub baseline_amount: f64,
    pub deviation_percent: f64,
    pub explanation: Option<String>,
    pub possible_causes: Vec<String>,
    pub detected_at: DateTime<Utc>,
    pub is_acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// A scored anomaly ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCostAnomaly {
    pub resource_id: Option<i64>,
    pub anomaly_type: CostAnomalyType,
    pub amount: f64,
    pub baseline_amount: f64,
    pub deviation_percent: f64,
    pub explanation: Option<String>,
    pub possible_causes: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AnomalyFilter {
    pub acknowledged: Option<bool>,
    pub resource_id: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectAnomalyRequest {
    pub resource_id: i64,
    pub amount: f64,
    pub anomaly_type: CostAnomalyType,
}

// =====================================================
// Metrics
// =====================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: i64,
    pub resource_id: i64,
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMetricRequest {
    pub resource_id: i64,
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricReading {
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestBatchRequest {
    pub resource_id: i64,
    pub metrics: Vec<MetricReading>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchIngestResult {
    pub metrics_ingested: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricSeriesRequest {
    pub resource_id: i64,
    pub name: String,
    #[serde(default)]
    pub window: MetricWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSeries {
    pub resource_id: i64,
    pub name: String,
    pub unit: Option<String>,
    pub points: Vec<MetricDataPoint>,
    pub min_value: f64,
    pub max_value: f64,
    pub avg_value: f64,
}

// =====================================================
// Change Events
// =====================================================

/// A recorded change (deployment, scaling, failover, ...) on one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: i64,
    pub resource_id: i64,
    pub change_type: ChangeType,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    /// Where the change came from: console, api, automation
    pub source: Option<String>,
    pub impact: Option<ChangeImpact>,
    pub executed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChangeEvent {
    pub resource_id: i64,
    pub change_type: ChangeType,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub source: Option<String>,
    pub impact: Option<ChangeImpact>,
    pub executed_at: DateTime<Utc>,
}

// =====================================================
// Fleet Overview
// =====================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total_resources: i64,
    pub healthy_count: i64,
    pub warning_count: i64,
    pub critical_count: i64,
    pub healthy_percentage: f64,
    pub overall_health_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueBrief {
    pub id: i64,
    pub resource_id: i64,
    pub title: String,
    pub severity: IssueSeverity,
    pub category: IssueCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeBrief {
    pub id: i64,
    pub resource_id: i64,
    pub title: String,
    pub change_type: ChangeType,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub health: HealthSummary,
    pub total_monthly_cost: f64,
    pub cost_trend_percent: f64,
    pub active_issues_count: i64,
    pub critical_issues_count: i64,
    pub resources_by_cloud: BTreeMap<String, i64>,
    pub resources_by_type: BTreeMap<String, i64>,
    pub top_issues: Vec<IssueBrief>,
    /// Newest first
    pub recent_changes: Vec<ChangeBrief>,
}

// =====================================================
// RPC Request Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceIdRequest {
    pub resource_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateIssueRequest {
    pub resource_id: i64,
    #[serde(flatten)]
    pub template: IssueTemplate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateIssueRequest {
    pub id: i64,
    #[serde(flatten)]
    pub update: IssueUpdate,
}

/// Acknowledge / resolve requests for issues and anomalies
#[derive(Debug, Serialize, Deserialize)]
pub struct ActorRequest {
    pub id: i64,
    pub actor: String,
}

// =====================================================
// RPC Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// =====================================================
// Service Status
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub total_resources: i64,
    pub open_issues: i64,
    pub unacknowledged_anomalies: i64,
    pub simulator_enabled: bool,
    pub ticks_completed: u64,
    pub last_tick_at: Option<String>,
    pub tick_interval_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_health_bucket_boundaries() {
        assert_eq!(HealthStatus::from_score(80.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_score(79.99), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_score(50.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_score(49.99), HealthStatus::Critical);
        assert_eq!(HealthStatus::from_score(100.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_score(0.0), HealthStatus::Critical);
    }

    #[test]
    fn test_issue_status_transitions() {
        use IssueStatus::*;
        assert!(Active.can_transition_to(Acknowledged));
        assert!(Active.can_transition_to(Resolved));
        assert!(Acknowledged.can_transition_to(Resolved));
        assert!(!Acknowledged.can_transition_to(Active));
        assert!(!Acknowledged.can_transition_to(Acknowledged));
        for next in [Active, Acknowledged, Resolved] {
            assert!(!Resolved.can_transition_to(next));
        }
        assert!(Acknowledged.is_open());
        assert!(!Resolved.is_open());
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!(CostAnomalyType::SustainedIncrease.as_ref(), "sustained_increase");
        assert_eq!("dynamodb".parse::<EngineType>().unwrap(), EngineType::Dynamodb);
        assert_eq!(BreakdownKey::Type.as_ref(), "type");
        assert_eq!(ChangeType::VersionUpgrade.as_ref(), "version_upgrade");
        assert_eq!("config_change".parse::<ChangeType>().unwrap(), ChangeType::ConfigChange);
        let json = serde_json::to_string(&MetricWindow::Week).unwrap();
        assert_eq!(json, "\"7d\"");
    }

    #[test]
    fn test_cost_window_previous_period() {
        let window = CostWindow::new(day(2024, 3, 11), day(2024, 3, 21));
        assert_eq!(window.length_days(), 10);
        let prev = window.previous();
        assert_eq!(prev.end, day(2024, 3, 10));
        assert_eq!(prev.start, day(2024, 2, 29));
    }

    #[test]
    fn test_rpc_response_skips_empty_fields() {
        let json = serde_json::to_value(RpcResponse::ok(3)).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
        let json = serde_json::to_value(RpcResponse::<i32>::err("nope")).unwrap();
        assert!(json.get("data").is_none());
    }
}
