//! Fleet-wide rollups for the dashboard and executive view.

use crate::db::{self, resources::ResourceColumn, Db};
use crate::error::FleetResult;
use fleet_monitor_types::*;
use rusqlite::Connection;

const TOP_ISSUES: usize = 5;
const RECENT_CHANGES: i64 = 5;

/// Weighted rollup: healthy counts 100, warning 50, critical 0. An empty fleet is fully healthy.
pub fn rollup_from_counts(healthy: i64, warning: i64, critical: i64) -> HealthSummary {
    let total = healthy + warning + critical;
    let (healthy_percentage, overall_health_score) = if total > 0 {
        (
            healthy as f64 / total as f64 * 100.0,
            (healthy * 100 + warning * 50) as f64 / total as f64,
        )
    } else {
        (100.0, 100.0)
    };
    HealthSummary {
        total_resources: total,
        healthy_count: healthy,
        warning_count: warning,
        critical_count: critical,
        healthy_percentage,
        overall_health_score,
    }
}

pub fn health_summary(db: &Db) -> FleetResult<HealthSummary> {
    db.read(health_summary_in)
}

fn health_summary_in(conn: &Connection) -> FleetResult<HealthSummary> {
    let counts = db::resources::count_grouped(conn, ResourceColumn::HealthStatus)?;
    let count_of = |status: HealthStatus| counts.get(status.as_ref()).copied().unwrap_or(0);
    Ok(rollup_from_counts(
        count_of(HealthStatus::Healthy),
        count_of(HealthStatus::Warning),
        count_of(HealthStatus::Critical),
    ))
}

/// Only issues still in `Active` count here; acknowledged ones are already being handled.
/// All figures come from a single read.
pub fn executive_summary(db: &Db) -> FleetResult<ExecutiveSummary> {
    db.read(|conn| {
        let health = health_summary_in(conn)?;
        let (total_monthly_cost, cost_trend_percent) = db::resources::cost_totals(conn)?;
        let top_issues = db::issues::query(
            conn,
            &IssueFilter {
                status: Some(IssueStatus::Active),
                limit: Some(TOP_ISSUES),
                ..Default::default()
            },
        )?
        .into_iter()
        .map(|issue| IssueBrief {
            id: issue.id,
            resource_id: issue.resource_id,
            title: issue.title,
            severity: issue.severity,
            category: issue.category,
        })
        .collect();
        let recent_changes = db::changes::recent(conn, RECENT_CHANGES)?
            .into_iter()
            .map(|change| ChangeBrief {
                id: change.id,
                resource_id: change.resource_id,
                title: change.title,
                change_type: change.change_type,
                executed_at: change.executed_at,
            })
            .collect();

        Ok(ExecutiveSummary {
            health,
            total_monthly_cost,
            cost_trend_percent,
            active_issues_count: db::issues::count_where(conn, IssueStatus::Active, None)?,
            critical_issues_count: db::issues::count_where(
                conn,
                IssueStatus::Active,
                Some(IssueSeverity::Critical),
            )?,
            resources_by_cloud: db::resources::count_grouped(conn, ResourceColumn::CloudProvider)?,
            resources_by_type: db::resources::count_grouped(conn, ResourceColumn::Engine)?,
            top_issues,
            recent_changes,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;
    use crate::resources::{create_resource, fixtures};
    use chrono::{Duration, Utc};

    #[test]
    fn test_rollup_weights() {
        let summary = rollup_from_counts(2, 1, 1);
        assert_eq!(summary.total_resources, 4);
        assert_eq!(summary.healthy_percentage, 50.0);
        assert_eq!(summary.overall_health_score, 62.5);

        let empty = rollup_from_counts(0, 0, 0);
        assert_eq!(empty.overall_health_score, 100.0);
        assert_eq!(empty.healthy_percentage, 100.0);
    }

    #[test]
    fn test_health_summary_reads_buckets() {
        let db = Db::open(":memory:").unwrap();
        fixtures::resource(&db, "calm-db");
        let mut hot = fixtures::new_resource("hot-db", CloudProvider::Gcp, EngineType::Mysql, "us-central1");
        hot.cpu_usage = 100.0;
        hot.memory_usage = 100.0;
        hot.storage_usage = 100.0;
        hot.connections_active = 100;
        create_resource(&db, &hot).unwrap();

        let summary = health_summary(&db).unwrap();
        assert_eq!(summary.total_resources, 2);
        assert_eq!(summary.healthy_count, 1);
        assert_eq!(summary.warning_count, 1);
        assert_eq!(summary.overall_health_score, 75.0);
    }

    #[test]
    fn test_executive_summary_counts_active_only() {
        let db = Db::open(":memory:").unwrap();
        let a = fixtures::resource(&db, "a-db");
        let b = create_resource(
            &db,
            &fixtures::new_resource("b-db", CloudProvider::Azure, EngineType::Redis, "eastus"),
        )
        .unwrap();

        let storage = lifecycle::ISSUE_TEMPLATES[2].to_template();
        let cpu = lifecycle::ISSUE_TEMPLATES[0].to_template();
        let backup = lifecycle::ISSUE_TEMPLATES[5].to_template();
        lifecycle::create_or_bump(&db, a.id, &storage).unwrap();
        lifecycle::create_or_bump(&db, b.id, &cpu).unwrap();
        let acked = lifecycle::create_or_bump(&db, b.id, &backup).unwrap().issue;
        lifecycle::acknowledge(&db, acked.id, "oncall").unwrap();

        let exec = executive_summary(&db).unwrap();
        assert_eq!(exec.active_issues_count, 2);
        assert_eq!(exec.critical_issues_count, 1);
        assert_eq!(exec.top_issues.len(), 2);
        assert_eq!(exec.top_issues[0].severity, IssueSeverity::Critical);
        assert_eq!(exec.total_monthly_cost, 600.0);
        assert_eq!(exec.resources_by_cloud.get("aws"), Some(&1));
        assert_eq!(exec.resources_by_type.get("redis"), Some(&1));
        assert!(exec.recent_changes.is_empty());
    }

    #[test]
    fn test_executive_summary_lists_five_newest_changes() {
        let db = Db::open(":memory:").unwrap();
        let a = fixtures::resource(&db, "a-db");
        let now = Utc::now();
        db.transaction(|tx| {
            for days_ago in 0..7 {
                db::changes::insert(
                    tx,
                    &NewChangeEvent {
                        resource_id: a.id,
                        change_type: ChangeType::Scaling,
                        title: format!("Scaling event {}", days_ago),
                        description: None,
                        author: Some("devops@company.com".to_string()),
                        source: Some("automation".to_string()),
                        impact: Some(ChangeImpact::Medium),
                        executed_at: now - Duration::days(days_ago),
                    },
                    now,
                )?;
            }
            Ok(())
        })
        .unwrap();

        let exec = executive_summary(&db).unwrap();
        let titles: Vec<&str> = exec.recent_changes.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Scaling event 0", "Scaling event 1", "Scaling event 2", "Scaling event 3", "Scaling event 4"]
        );
        assert!(exec.recent_changes.iter().all(|c| c.resource_id == a.id));

        // change history goes with the resource
        crate::resources::delete_resource(&db, a.id).unwrap();
        assert!(executive_summary(&db).unwrap().recent_changes.is_empty());
    }
}
