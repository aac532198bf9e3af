//! Cost anomaly rows.

use super::{encode_string_list, page_size, parse_enum, parse_string_list};
use crate::error::FleetResult;
use chrono::{DateTime, Utc};
use fleet_monitor_types::*;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};

const ANOMALY_COLUMNS: &str = "id, resource_id, anomaly_type, amount, baseline_amount,
    deviation_percent, explanation, possible_causes_json, detected_at, is_acknowledged,
    acknowledged_by, acknowledged_at";

pub fn insert(conn: &Connection, anomaly: &NewCostAnomaly, now: DateTime<Utc>) -> FleetResult<i64> {
    let causes = encode_string_list(&anomaly.possible_causes)?;
    conn.execute(
        "INSERT INTO cost_anomalies (resource_id, anomaly_type, amount, baseline_amount,
            deviation_percent, explanation, possible_causes_json, detected_at, is_acknowledged)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
        rusqlite::params![
            anomaly.resource_id,
            anomaly.anomaly_type.as_ref(),
            anomaly.amount,
            anomaly.baseline_amount,
            anomaly.deviation_percent,
            anomaly.explanation,
            causes,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> SqliteResult<Option<CostAnomaly>> {
    conn.query_row(
        &format!("SELECT {} FROM cost_anomalies WHERE id = ?1", ANOMALY_COLUMNS),
        [id],
        row_to_anomaly,
    )
    .optional()
}

/// Newest first.
pub fn query(conn: &Connection, filter: &AnomalyFilter) -> SqliteResult<Vec<CostAnomaly>> {
    let mut sql = format!("SELECT {} FROM cost_anomalies WHERE 1=1", ANOMALY_COLUMNS);
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(acknowledged) = filter.acknowledged {
        params.push(Box::new(acknowledged as i32));
        sql.push_str(&format!(" AND is_acknowledged = ?{}", params.len()));
    }
    if let Some(resource_id) = filter.resource_id {
        params.push(Box::new(resource_id));
        sql.push_str(&format!(" AND resource_id = ?{}", params.len()));
    }

    params.push(Box::new(page_size(filter.limit, 20)));
    sql.push_str(&format!(" ORDER BY detected_at DESC, id DESC LIMIT ?{}", params.len()));

    let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_ref.as_slice(), row_to_anomaly)?;
    rows.collect()
}

/// Anomalies detected at or after `since`, newest first.
pub fn detected_since(conn: &Connection, since: DateTime<Utc>, limit: i64) -> SqliteResult<Vec<CostAnomaly>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM cost_anomalies WHERE detected_at >= ?1
         ORDER BY detected_at DESC, id DESC LIMIT ?2",
        ANOMALY_COLUMNS
    ))?;
    let rows = stmt.query_map(rusqlite::params![since, limit], row_to_anomaly)?;
    rows.collect()
}

/// Set the acknowledgement only if nobody has yet. Returns whether this call won.
pub fn acknowledge_once(conn: &Connection, id: i64, actor: &str, now: DateTime<Utc>) -> SqliteResult<bool> {
    let rows = conn.execute(
        "UPDATE cost_anomalies SET is_acknowledged = 1, acknowledged_by = ?1, acknowledged_at = ?2
         WHERE id = ?3 AND is_acknowledged = 0",
        rusqlite::params![actor, now, id],
    )?;
    Ok(rows > 0)
}

pub fn count_unacknowledged(conn: &Connection) -> SqliteResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM cost_anomalies WHERE is_acknowledged = 0",
        [],
        |row| row.get(0),
    )
}

fn row_to_anomaly(row: &rusqlite::Row) -> SqliteResult<CostAnomaly> {
    Ok(CostAnomaly {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        anomaly_type: parse_enum(2, row.get(2)?)?,
        amount: row.get(3)?,
        baseline_amount: row.get(4)?,
        deviation_percent: row.get(5)?,
        explanation: row.get(6)?,
        possible_causes: parse_string_list(7, row.get(7)?)?,
        detected_at: row.get(8)?,
        is_acknowledged: row.get::<_, i32>(9)? != 0,
        acknowledged_by: row.get(10)?,
        acknowledged_at: row.get(11)?,
    })
}
