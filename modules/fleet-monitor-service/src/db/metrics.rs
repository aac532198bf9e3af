//! Raw metric samples.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Result as SqliteResult};
use fleet_monitor_types::MetricSample;

pub fn insert(
    conn: &Connection,
    resource_id: i64,
    name: &str,
    value: f64,
    unit: Option<&str>,
    recorded_at: DateTime<Utc>,
) -> SqliteResult<i64> {
    conn.execute(
        "INSERT INTO metric_samples (resource_id, name, value, unit, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![resource_id, name, value, unit, recorded_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Samples of one metric recorded at or after `since`, oldest first.
pub fn series(conn: &Connection, resource_id: i64, name: &str, since: DateTime<Utc>) -> SqliteResult<Vec<MetricSample>> {
    let mut stmt = conn.prepare(
        "SELECT id, resource_id, name, value, unit, recorded_at FROM metric_samples
         WHERE resource_id = ?1 AND name = ?2 AND recorded_at >= ?3
         ORDER BY recorded_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(rusqlite::params![resource_id, name, since], |row| {
        Ok(MetricSample {
            id: row.get(0)?,
            resource_id: row.get(1)?,
            name: row.get(2)?,
            value: row.get(3)?,
            unit: row.get(4)?,
            recorded_at: row.get(5)?,
        })
    })?;
    rows.collect()
}

pub fn distinct_names(conn: &Connection, resource_id: i64) -> SqliteResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT name FROM metric_samples WHERE resource_id = ?1 ORDER BY name ASC",
    )?;
    let rows = stmt.query_map([resource_id], |row| row.get(0))?;
    rows.collect()
}
