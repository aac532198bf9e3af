//! Issue rows. Counter bookkeeping lives in `crate::lifecycle`, not here.

use super::{encode_string_list, page_size, parse_enum, parse_string_list};
use crate::error::FleetResult;
use chrono::{DateTime, Utc};
use fleet_monitor_types::*;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};

const ISSUE_COLUMNS: &str = "id, resource_id, title, description, severity, category, status,
    ai_explanation, ai_recommendations_json, occurrence_count, first_detected_at,
    last_detected_at, acknowledged_at, acknowledged_by, resolved_at, resolved_by,
    created_at, updated_at";

const SEVERITY_ORDER: &str =
    "CASE severity WHEN 'critical' THEN 0 WHEN 'warning' THEN 1 ELSE 2 END";

pub fn insert(
    conn: &Connection,
    resource_id: i64,
    template: &IssueTemplate,
    now: DateTime<Utc>,
) -> FleetResult<i64> {
    let recommendations = encode_string_list(&template.ai_recommendations)?;
    conn.execute(
        "INSERT INTO issues (resource_id, title, description, severity, category, status,
            ai_explanation, ai_recommendations_json, occurrence_count,
            first_detected_at, last_detected_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7, 1, ?8, ?8, ?8, ?8)",
        rusqlite::params![
            resource_id,
            template.title,
            template.description,
            template.severity.as_ref(),
            template.category.as_ref(),
            template.ai_explanation,
            recommendations,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> SqliteResult<Option<Issue>> {
    conn.query_row(
        &format!("SELECT {} FROM issues WHERE id = ?1", ISSUE_COLUMNS),
        [id],
        row_to_issue,
    )
    .optional()
}

/// The `Active` issue carrying this dedup key, if any.
pub fn find_active_by_title(conn: &Connection, resource_id: i64, title: &str) -> SqliteResult<Option<Issue>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM issues
             WHERE resource_id = ?1 AND title = ?2 AND status = 'active'
             ORDER BY id ASC LIMIT 1",
            ISSUE_COLUMNS
        ),
        rusqlite::params![resource_id, title],
        row_to_issue,
    )
    .optional()
}

pub fn bump_occurrence(conn: &Connection, id: i64, now: DateTime<Utc>) -> SqliteResult<bool> {
    let rows = conn.execute(
        "UPDATE issues SET occurrence_count = occurrence_count + 1,
            last_detected_at = ?1, updated_at = ?1
         WHERE id = ?2",
        rusqlite::params![now, id],
    )?;
    Ok(rows > 0)
}

pub fn mark_acknowledged(conn: &Connection, id: i64, actor: &str, now: DateTime<Utc>) -> SqliteResult<bool> {
    let rows = conn.execute(
        "UPDATE issues SET status = 'acknowledged', acknowledged_by = ?1,
            acknowledged_at = ?2, updated_at = ?2
         WHERE id = ?3",
        rusqlite::params![actor, now, id],
    )?;
    Ok(rows > 0)
}

pub fn mark_resolved(conn: &Connection, id: i64, actor: &str, now: DateTime<Utc>) -> SqliteResult<bool> {
    let rows = conn.execute(
        "UPDATE issues SET status = 'resolved', resolved_by = ?1,
            resolved_at = ?2, updated_at = ?2
         WHERE id = ?3",
        rusqlite::params![actor, now, id],
    )?;
    Ok(rows > 0)
}

/// Update the free-text annotation fields that are set.
pub fn update_annotations(
    conn: &Connection,
    id: i64,
    description: Option<&str>,
    ai_explanation: Option<&str>,
    ai_recommendations: Option<&[String]>,
    now: DateTime<Utc>,
) -> FleetResult<bool> {
    let mut updates = vec!["updated_at = ?1".to_string()];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

    if let Some(description) = description {
        params.push(Box::new(description.to_string()));
        updates.push(format!("description = ?{}", params.len()));
    }
    if let Some(explanation) = ai_explanation {
        params.push(Box::new(explanation.to_string()));
        updates.push(format!("ai_explanation = ?{}", params.len()));
    }
    if let Some(recommendations) = ai_recommendations {
        params.push(Box::new(encode_string_list(recommendations)?));
        updates.push(format!("ai_recommendations_json = ?{}", params.len()));
    }

    params.push(Box::new(id));
    let sql = format!(
        "UPDATE issues SET {} WHERE id = ?{}",
        updates.join(", "),
        params.len()
    );
    let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = conn.execute(&sql, params_ref.as_slice())?;
    Ok(rows > 0)
}

pub fn delete(conn: &Connection, id: i64) -> SqliteResult<bool> {
    let rows = conn.execute("DELETE FROM issues WHERE id = ?1", [id])?;
    Ok(rows > 0)
}

/// Issues matching the filter, critical first, then most recently detected.
pub fn query(conn: &Connection, filter: &IssueFilter) -> SqliteResult<Vec<Issue>> {
    let mut sql = format!("SELECT {} FROM issues WHERE 1=1", ISSUE_COLUMNS);
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(severity) = filter.severity {
        params.push(Box::new(severity.as_ref().to_string()));
        sql.push_str(&format!(" AND severity = ?{}", params.len()));
    }
    if let Some(category) = filter.category {
        params.push(Box::new(category.as_ref().to_string()));
        sql.push_str(&format!(" AND category = ?{}", params.len()));
    }
    if let Some(status) = filter.status {
        params.push(Box::new(status.as_ref().to_string()));
        sql.push_str(&format!(" AND status = ?{}", params.len()));
    }
    if let Some(resource_id) = filter.resource_id {
        params.push(Box::new(resource_id));
        sql.push_str(&format!(" AND resource_id = ?{}", params.len()));
    }

    params.push(Box::new(page_size(filter.limit, 100)));
    sql.push_str(&format!(
        " ORDER BY {}, last_detected_at DESC, id DESC LIMIT ?{}",
        SEVERITY_ORDER,
        params.len()
    ));

    let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_ref.as_slice(), row_to_issue)?;
    rows.collect()
}

/// Ids of every issue currently in `status`.
pub fn ids_with_status(conn: &Connection, status: IssueStatus) -> SqliteResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM issues WHERE status = ?1 ORDER BY id ASC")?;
    let rows = stmt.query_map([status.as_ref()], |row| row.get(0))?;
    rows.collect()
}

/// Count of non-resolved issues on one resource; the source of truth for the counter.
#[cfg(test)]
pub fn count_open_for_resource(conn: &Connection, resource_id: i64) -> SqliteResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM issues WHERE resource_id = ?1 AND status != 'resolved'",
        [resource_id],
        |row| row.get(0),
    )
}

/// (resource_id, stored counter, open issue count) for resources where the two differ.
pub fn counter_mismatches(conn: &Connection) -> SqliteResult<Vec<(i64, i64, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.active_issue_count,
                (SELECT COUNT(*) FROM issues i WHERE i.resource_id = r.id AND i.status != 'resolved') AS open
         FROM resources r
         WHERE r.active_issue_count != open
         ORDER BY r.id ASC",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
    rows.collect()
}

/// Group counts over one of the enum columns.
pub fn count_by(conn: &Connection, column: &'static str) -> SqliteResult<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, COUNT(*) FROM issues GROUP BY {}",
        column, column
    ))?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

pub fn count_where(conn: &Connection, status: IssueStatus, severity: Option<IssueSeverity>) -> SqliteResult<i64> {
    match severity {
        Some(severity) => conn.query_row(
            "SELECT COUNT(*) FROM issues WHERE status = ?1 AND severity = ?2",
            [status.as_ref(), severity.as_ref()],
            |row| row.get(0),
        ),
        None => conn.query_row(
            "SELECT COUNT(*) FROM issues WHERE status = ?1",
            [status.as_ref()],
            |row| row.get(0),
        ),
    }
}

fn row_to_issue(row: &rusqlite::Row) -> SqliteResult<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        severity: parse_enum(4, row.get(4)?)?,
        category: parse_enum(5, row.get(5)?)?,
        status: parse_enum(6, row.get(6)?)?,
        ai_explanation: row.get(7)?,
        ai_recommendations: parse_string_list(8, row.get(8)?)?,
        occurrence_count: row.get(9)?,
        first_detected_at: row.get(10)?,
        last_detected_at: row.get(11)?,
        acknowledged_at: row.get(12)?,
        acknowledged_by: row.get(13)?,
        resolved_at: row.get(14)?,
        resolved_by: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}
