//! Issue lifecycle: `Active -> Acknowledged -> Resolved`, or `Active -> Resolved`.
//!
//! Every operation that can change whether an issue is open writes the issue row and the
//! owning resource's `active_issue_count` in the same transaction, so between operations the
//! counter always equals the number of the resource's non-resolved issues.

use crate::db::{self, Db};
use crate::error::{FleetError, FleetResult};
use chrono::{DateTime, Utc};
use fleet_monitor_types::*;
use rusqlite::Connection;

/// Actor recorded when an update changes status without naming one.
const DEFAULT_ACTOR: &str = "api";

// =====================================================
// Template catalogue
// =====================================================

pub struct CatalogEntry {
    pub title: &'static str,
    pub description: &'static str,
    pub severity: IssueSeverity,
    pub category: IssueCategory,
    pub ai_explanation: &'static str,
    pub ai_recommendations: [&'static str; 3],
}

impl CatalogEntry {
    pub fn to_template(&self) -> IssueTemplate {
        IssueTemplate {
            title: self.title.to_string(),
            description: self.description.to_string(),
            severity: self.severity,
            category: self.category,
            ai_explanation: Some(self.ai_explanation.to_string()),
            ai_recommendations: self.ai_recommendations.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Detections the seeder and simulator draw from.
pub static ISSUE_TEMPLATES: [CatalogEntry; 8] = [
    CatalogEntry {
        title: "High CPU Usage Detected",
        description: "CPU utilization has exceeded 85% for over 5 minutes",
        severity: IssueSeverity::Warning,
        category: IssueCategory::Performance,
        ai_explanation: "The database is experiencing elevated CPU load, likely due to complex queries or increased traffic.",
        ai_recommendations: ["Review slow query log", "Consider query optimization", "Evaluate scaling options"],
    },
    CatalogEntry {
        title: "Connection Limit Approaching",
        description: "Active connections at 90% of maximum capacity",
        severity: IssueSeverity::Warning,
        category: IssueCategory::Capacity,
        ai_explanation: "Connection pool is nearing exhaustion. New connections may be rejected.",
        ai_recommendations: ["Increase max_connections", "Implement connection pooling", "Review connection lifecycle"],
    },
    CatalogEntry {
        title: "Storage Space Low",
        description: "Available storage below 15% threshold",
        severity: IssueSeverity::Critical,
        category: IssueCategory::Capacity,
        ai_explanation: "Disk space is critically low. The database may become read-only if storage is exhausted.",
        ai_recommendations: ["Expand storage immediately", "Archive old data", "Review data retention policies"],
    },
    CatalogEntry {
        title: "Replication Lag Detected",
        description: "Replica is lagging behind primary by more than 30 seconds",
        severity: IssueSeverity::Warning,
        category: IssueCategory::Availability,
        ai_explanation: "Data synchronization delay detected between primary and replica instances.",
        ai_recommendations: ["Check network connectivity", "Review write throughput", "Consider replica scaling"],
    },
    CatalogEntry {
        title: "Deadlock Detected",
        description: "Multiple deadlocks occurred in the last hour",
        severity: IssueSeverity::Critical,
        category: IssueCategory::Performance,
        ai_explanation: "Concurrent transactions are blocking each other and degrading throughput.",
        ai_recommendations: ["Review transaction isolation levels", "Optimize lock ordering", "Consider query restructuring"],
    },
    CatalogEntry {
        title: "Backup Failure",
        description: "Scheduled backup failed to complete",
        severity: IssueSeverity::Critical,
        category: IssueCategory::Availability,
        ai_explanation: "The automated backup did not complete. Point-in-time recovery may be compromised.",
        ai_recommendations: ["Check backup storage availability", "Review backup logs", "Trigger manual backup"],
    },
    CatalogEntry {
        title: "Unusual Query Pattern",
        description: "Detected anomalous query patterns that may indicate security concerns",
        severity: IssueSeverity::Warning,
        category: IssueCategory::Security,
        ai_explanation: "Query patterns deviate from baseline and may indicate unauthorized access attempts.",
        ai_recommendations: ["Review query logs", "Check access credentials", "Enable additional monitoring"],
    },
    CatalogEntry {
        title: "Memory Pressure High",
        description: "Memory usage consistently above 90%",
        severity: IssueSeverity::Warning,
        category: IssueCategory::Performance,
        ai_explanation: "High memory utilization may lead to swapping and degraded performance.",
        ai_recommendations: ["Increase instance memory", "Review memory-intensive queries", "Optimize buffer pool settings"],
    },
];

// =====================================================
// Operations
// =====================================================

/// Open a new issue for `(resource_id, title)` or bump the active one carrying that key.
pub fn create_or_bump(db: &Db, resource_id: i64, template: &IssueTemplate) -> FleetResult<IssueDetection> {
    validate_template(template)?;
    db.transaction(|tx| create_or_bump_in(tx, resource_id, template, Utc::now()))
}

pub(crate) fn create_or_bump_in(
    conn: &Connection,
    resource_id: i64,
    template: &IssueTemplate,
    now: DateTime<Utc>,
) -> FleetResult<IssueDetection> {
    db::resources::require(conn, resource_id)?;

    if let Some(existing) = db::issues::find_active_by_title(conn, resource_id, &template.title)? {
        db::issues::bump_occurrence(conn, existing.id, now)?;
        return Ok(IssueDetection {
            issue: require_issue(conn, existing.id)?,
            created: false,
        });
    }

    let id = db::issues::insert(conn, resource_id, template, now)?;
    if !db::resources::increment_issue_count(conn, resource_id)? {
        return Err(FleetError::not_found("Resource", resource_id));
    }
    Ok(IssueDetection {
        issue: require_issue(conn, id)?,
        created: true,
    })
}

pub fn acknowledge(db: &Db, id: i64, actor: &str) -> FleetResult<Issue> {
    validate_actor(actor)?;
    db.transaction(|tx| acknowledge_in(tx, id, actor, Utc::now()))
}

pub(crate) fn acknowledge_in(conn: &Connection, id: i64, actor: &str, now: DateTime<Utc>) -> FleetResult<Issue> {
    let issue = require_issue(conn, id)?;
    ensure_transition(&issue, IssueStatus::Acknowledged)?;
    db::issues::mark_acknowledged(conn, id, actor, now)?;
    require_issue(conn, id)
}

pub fn resolve(db: &Db, id: i64, actor: &str) -> FleetResult<Issue> {
    validate_actor(actor)?;
    db.transaction(|tx| resolve_in(tx, id, actor, Utc::now()))
}

pub(crate) fn resolve_in(conn: &Connection, id: i64, actor: &str, now: DateTime<Utc>) -> FleetResult<Issue> {
    let issue = require_issue(conn, id)?;
    if issue.status.is_terminal() {
        return Err(FleetError::AlreadyResolved { id });
    }
    ensure_transition(&issue, IssueStatus::Resolved)?;
    db::issues::mark_resolved(conn, id, actor, now)?;
    if !db::resources::decrement_issue_count(conn, issue.resource_id)? {
        return Err(FleetError::not_found("Resource", issue.resource_id));
    }
    require_issue(conn, id)
}

/// Remove the issue. An open issue releases its slot in the resource counter.
pub fn delete(db: &Db, id: i64) -> FleetResult<()> {
    db.transaction(|tx| {
        let issue = require_issue(tx, id)?;
        db::issues::delete(tx, id)?;
        if issue.status.is_open() && !db::resources::decrement_issue_count(tx, issue.resource_id)? {
            return Err(FleetError::not_found("Resource", issue.resource_id));
        }
        Ok(())
    })
}

/// Edit annotations and optionally move the issue along its lifecycle.
pub fn update(db: &Db, id: i64, changes: &IssueUpdate) -> FleetResult<Issue> {
    if let Some(ref actor) = changes.actor {
        validate_actor(actor)?;
    }
    db.transaction(|tx| {
        let now = Utc::now();
        let current = require_issue(tx, id)?;

        if let Some(next) = changes.status {
            let actor = changes.actor.as_deref().unwrap_or(DEFAULT_ACTOR);
            if next != current.status {
                ensure_transition(&current, next)?;
                if next == IssueStatus::Acknowledged {
                    acknowledge_in(tx, id, actor, now)?;
                } else {
                    resolve_in(tx, id, actor, now)?;
                }
            }
        }

        db::issues::update_annotations(
            tx,
            id,
            changes.description.as_deref(),
            changes.ai_explanation.as_deref(),
            changes.ai_recommendations.as_deref(),
            now,
        )?;
        require_issue(tx, id)
    })
}

pub fn get_issue(db: &Db, id: i64) -> FleetResult<Issue> {
    db.read(|conn| require_issue(conn, id))
}

pub fn list_issues(db: &Db, filter: &IssueFilter) -> FleetResult<Vec<Issue>> {
    db.read(|conn| Ok(db::issues::query(conn, filter)?))
}

pub fn issue_summary(db: &Db) -> FleetResult<IssueSummary> {
    db.read(|conn| {
        let mut summary = IssueSummary::default();
        for (severity, count) in db::issues::count_by(conn, "severity")? {
            summary.total_issues += count;
            match severity.parse::<IssueSeverity>() {
                Ok(IssueSeverity::Critical) => summary.critical_count = count,
                Ok(IssueSeverity::Warning) => summary.warning_count = count,
                Ok(IssueSeverity::Info) => summary.info_count = count,
                Err(_) => log::warn!("[FLEET_MONITOR] Unknown issue severity '{}' in store", severity),
            }
        }
        for (status, count) in db::issues::count_by(conn, "status")? {
            match status.parse::<IssueStatus>() {
                Ok(IssueStatus::Active) => summary.active_count = count,
                Ok(IssueStatus::Acknowledged) => summary.acknowledged_count = count,
                Ok(IssueStatus::Resolved) => summary.resolved_count = count,
                Err(_) => log::warn!("[FLEET_MONITOR] Unknown issue status '{}' in store", status),
            }
        }
        summary.by_category = db::issues::count_by(conn, "category")?.into_iter().collect();
        Ok(summary)
    })
}

/// Resources whose stored counter disagrees with their open issues. Expected to be empty.
pub fn counter_drift(db: &Db) -> FleetResult<Vec<CounterDrift>> {
    db.read(|conn| {
        Ok(db::issues::counter_mismatches(conn)?
            .into_iter()
            .map(|(resource_id, stored, actual)| CounterDrift {
                resource_id,
                stored,
                actual,
            })
            .collect())
    })
}

fn require_issue(conn: &Connection, id: i64) -> FleetResult<Issue> {
    db::issues::get(conn, id)?.ok_or_else(|| FleetError::not_found("Issue", id))
}

fn ensure_transition(issue: &Issue, next: IssueStatus) -> FleetResult<()> {
    if !issue.status.can_transition_to(next) {
        return Err(FleetError::InvalidTransition {
            from: issue.status,
            to: next,
        });
    }
    Ok(())
}

fn validate_template(template: &IssueTemplate) -> FleetResult<()> {
    if template.title.trim().is_empty() {
        return Err(FleetError::validation("issue title must not be empty"));
    }
    Ok(())
}

fn validate_actor(actor: &str) -> FleetResult<()> {
    if actor.trim().is_empty() {
        return Err(FleetError::validation("actor must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::fixtures;

    fn template(title: &str) -> IssueTemplate {
        IssueTemplate {
            title: title.to_string(),
            description: "test".to_string(),
            severity: IssueSeverity::Warning,
            category: IssueCategory::Performance,
            ai_explanation: None,
            ai_recommendations: vec![],
        }
    }

    fn stored_counter(db: &Db, resource_id: i64) -> i64 {
        crate::resources::get_resource(db, resource_id).unwrap().active_issue_count
    }

    fn open_count(db: &Db, resource_id: i64) -> i64 {
        db.read(|conn| Ok(db::issues::count_open_for_resource(conn, resource_id)?))
            .unwrap()
    }

    fn assert_counter_consistent(db: &Db, resource_id: i64) {
        assert_eq!(stored_counter(db, resource_id), open_count(db, resource_id));
        assert!(counter_drift(db).unwrap().is_empty());
    }

    #[test]
    fn test_dedup_bumps_active_issue() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "users-primary");

        let first = create_or_bump(&db, res.id, &template("Deadlock Detected")).unwrap();
        assert!(first.created);
        assert_eq!(first.issue.occurrence_count, 1);

        let second = create_or_bump(&db, res.id, &template("Deadlock Detected")).unwrap();
        assert!(!second.created);
        assert_eq!(second.issue.id, first.issue.id);
        assert_eq!(second.issue.occurrence_count, 2);
        assert!(second.issue.last_detected_at >= first.issue.last_detected_at);

        assert_eq!(list_issues(&db, &IssueFilter::default()).unwrap().len(), 1);
        assert_eq!(stored_counter(&db, res.id), 1);
    }

    #[test]
    fn test_acknowledged_issue_does_not_absorb_detection() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "orders-db");

        let first = create_or_bump(&db, res.id, &template("Backup Failure")).unwrap();
        acknowledge(&db, first.issue.id, "oncall").unwrap();

        let second = create_or_bump(&db, res.id, &template("Backup Failure")).unwrap();
        assert!(second.created);
        assert_ne!(second.issue.id, first.issue.id);
        assert_eq!(stored_counter(&db, res.id), 2);
        assert_counter_consistent(&db, res.id);
    }

    #[test]
    fn test_counter_invariant_across_operations() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "payments-db");
        let other = fixtures::resource(&db, "sessions-cache");

        let a = create_or_bump(&db, res.id, &template("A")).unwrap().issue;
        assert_counter_consistent(&db, res.id);
        let b = create_or_bump(&db, res.id, &template("B")).unwrap().issue;
        assert_counter_consistent(&db, res.id);
        let c = create_or_bump(&db, res.id, &template("C")).unwrap().issue;
        create_or_bump(&db, other.id, &template("A")).unwrap();
        assert_counter_consistent(&db, res.id);
        assert_eq!(stored_counter(&db, res.id), 3);

        acknowledge(&db, a.id, "alice").unwrap();
        assert_counter_consistent(&db, res.id);
        assert_eq!(stored_counter(&db, res.id), 3);

        resolve(&db, a.id, "alice").unwrap();
        assert_counter_consistent(&db, res.id);
        resolve(&db, b.id, "bob").unwrap();
        assert_counter_consistent(&db, res.id);
        assert_eq!(stored_counter(&db, res.id), 1);

        // resolved issue deletion leaves the counter alone, open one releases it
        delete(&db, a.id).unwrap();
        assert_counter_consistent(&db, res.id);
        delete(&db, c.id).unwrap();
        assert_counter_consistent(&db, res.id);
        assert_eq!(stored_counter(&db, res.id), 0);
        assert_eq!(stored_counter(&db, other.id), 1);
    }

    #[test]
    fn test_resolve_is_terminal() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "inventory-db");
        let issue = create_or_bump(&db, res.id, &template("Storage Space Low")).unwrap().issue;

        let resolved = resolve(&db, issue.id, "auto-remediation").unwrap();
        assert_eq!(resolved.status, IssueStatus::Resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("auto-remediation"));
        assert!(resolved.resolved_at.is_some());
        assert_eq!(stored_counter(&db, res.id), 0);

        let again = resolve(&db, issue.id, "someone");
        assert!(matches!(again, Err(FleetError::AlreadyResolved { id }) if id == issue.id));
        assert_eq!(stored_counter(&db, res.id), 0);

        let ack = acknowledge(&db, issue.id, "someone");
        assert!(matches!(
            ack,
            Err(FleetError::InvalidTransition { from: IssueStatus::Resolved, to: IssueStatus::Acknowledged })
        ));
    }

    #[test]
    fn test_acknowledge_requires_active() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "catalog-db");
        let issue = create_or_bump(&db, res.id, &template("Replication Lag Detected")).unwrap().issue;

        let acked = acknowledge(&db, issue.id, "oncall").unwrap();
        assert_eq!(acked.status, IssueStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("oncall"));

        assert!(matches!(
            acknowledge(&db, issue.id, "oncall"),
            Err(FleetError::InvalidTransition { from: IssueStatus::Acknowledged, .. })
        ));
        assert_eq!(stored_counter(&db, res.id), 1);
    }

    #[test]
    fn test_missing_entities_are_not_found() {
        let db = Db::open(":memory:").unwrap();
        assert!(matches!(
            create_or_bump(&db, 42, &template("X")),
            Err(FleetError::NotFound { entity: "Resource", id: 42 })
        ));
        assert!(matches!(acknowledge(&db, 7, "a"), Err(FleetError::NotFound { entity: "Issue", .. })));
        assert!(matches!(resolve(&db, 7, "a"), Err(FleetError::NotFound { .. })));
        assert!(matches!(delete(&db, 7), Err(FleetError::NotFound { .. })));
        assert!(matches!(
            update(&db, 7, &IssueUpdate::default()),
            Err(FleetError::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_annotations_and_status() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "events-db");
        let issue = create_or_bump(&db, res.id, &template("Memory Pressure High")).unwrap().issue;

        let updated = update(&db, issue.id, &IssueUpdate {
            ai_explanation: Some("Buffer pool undersized".to_string()),
            ai_recommendations: Some(vec!["Raise shared_buffers".to_string()]),
            status: Some(IssueStatus::Acknowledged),
            actor: Some("dba".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(updated.status, IssueStatus::Acknowledged);
        assert_eq!(updated.acknowledged_by.as_deref(), Some("dba"));
        assert_eq!(updated.ai_explanation.as_deref(), Some("Buffer pool undersized"));
        assert_eq!(updated.ai_recommendations, vec!["Raise shared_buffers"]);
        assert_eq!(updated.description, "test");

        // same status is a no-op
        update(&db, issue.id, &IssueUpdate {
            status: Some(IssueStatus::Acknowledged),
            ..Default::default()
        })
        .unwrap();

        let reopened = update(&db, issue.id, &IssueUpdate {
            status: Some(IssueStatus::Active),
            ..Default::default()
        });
        assert!(matches!(reopened, Err(FleetError::InvalidTransition { .. })));

        let resolved = update(&db, issue.id, &IssueUpdate {
            status: Some(IssueStatus::Resolved),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(resolved.resolved_by.as_deref(), Some(DEFAULT_ACTOR));
        assert_counter_consistent(&db, res.id);
    }

    #[test]
    fn test_failed_update_rolls_back_annotations() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "ledger-db");
        let issue = create_or_bump(&db, res.id, &template("Deadlock Detected")).unwrap().issue;
        resolve(&db, issue.id, "ops").unwrap();

        let result = update(&db, issue.id, &IssueUpdate {
            description: Some("changed".to_string()),
            status: Some(IssueStatus::Acknowledged),
            ..Default::default()
        });
        assert!(result.is_err());
        assert_eq!(get_issue(&db, issue.id).unwrap().description, "test");
    }

    #[test]
    fn test_list_orders_critical_first_and_summary() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "search-db");
        for entry in &ISSUE_TEMPLATES[..3] {
            create_or_bump(&db, res.id, &entry.to_template()).unwrap();
        }

        let issues = list_issues(&db, &IssueFilter::default()).unwrap();
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].severity, IssueSeverity::Critical);
        assert_eq!(issues[0].title, "Storage Space Low");

        let summary = issue_summary(&db).unwrap();
        assert_eq!(summary.total_issues, 3);
        assert_eq!(summary.critical_count, 1);
        assert_eq!(summary.warning_count, 2);
        assert_eq!(summary.active_count, 3);
        assert_eq!(summary.by_category.get("capacity"), Some(&2));
        assert_eq!(summary.by_category.get("performance"), Some(&1));
    }

    #[test]
    fn test_resource_delete_cascades_issues() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "legacy-db");
        let issue = create_or_bump(&db, res.id, &template("X")).unwrap().issue;
        crate::resources::delete_resource(&db, res.id).unwrap();
        assert!(matches!(get_issue(&db, issue.id), Err(FleetError::NotFound { .. })));
    }

    #[test]
    fn test_delete_open_issue_releases_counter() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "orders-db");
        let acked = create_or_bump(&db, res.id, &template("Slow Queries")).unwrap().issue;
        acknowledge(&db, acked.id, "dba").unwrap();
        let resolved = create_or_bump(&db, res.id, &template("Lock Waits")).unwrap().issue;
        resolve(&db, resolved.id, "dba").unwrap();
        assert_eq!(stored_counter(&db, res.id), 1);

        delete(&db, resolved.id).unwrap();
        assert_eq!(stored_counter(&db, res.id), 1);
        delete(&db, acked.id).unwrap();
        assert_counter_consistent(&db, res.id);
        assert_eq!(stored_counter(&db, res.id), 0);
    }

    #[test]
    fn test_delete_orphaned_issue_is_not_found() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "orphan-db");
        let issue = create_or_bump(&db, res.id, &template("X")).unwrap().issue;
        db.read(|conn| {
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys=OFF; DELETE FROM resources WHERE id = {}; PRAGMA foreign_keys=ON;",
                res.id
            ))?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            delete(&db, issue.id),
            Err(FleetError::NotFound { entity: "Resource", id }) if id == res.id
        ));
        assert!(matches!(
            resolve(&db, issue.id, "ops"),
            Err(FleetError::NotFound { entity: "Resource", .. })
        ));
        // rolled back
        assert_eq!(get_issue(&db, issue.id).unwrap().status, IssueStatus::Active);
    }

    #[test]
    fn test_empty_actor_and_title_rejected() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "x-db");
        assert!(matches!(create_or_bump(&db, res.id, &template("  ")), Err(FleetError::Validation(_))));
        let issue = create_or_bump(&db, res.id, &template("X")).unwrap().issue;
        assert!(matches!(resolve(&db, issue.id, ""), Err(FleetError::Validation(_))));
        assert_counter_consistent(&db, res.id);
    }
}
