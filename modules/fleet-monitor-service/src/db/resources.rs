//! Resource rows and the denormalised snapshot / issue counter columns.

use super::{page_size, parse_enum};
use crate::error::{FleetError, FleetResult};
use chrono::{DateTime, Utc};
use fleet_monitor_types::*;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use std::collections::BTreeMap;

const RESOURCE_COLUMNS: &str = "id, name, engine, cloud_provider, region, environment,
    cpu_usage, memory_usage, storage_usage, connections_active, connections_max,
    health_score, health_status, monthly_cost, cost_trend, version, instance_type,
    storage_size_gb, active_issue_count, created_at, updated_at, last_seen_at";

/// Grouping columns the rollups may count by.
#[derive(Debug, Clone, Copy)]
pub enum ResourceColumn {
    CloudProvider,
    Engine,
    HealthStatus,
}

impl ResourceColumn {
    fn sql(&self) -> &'static str {
        match self {
            ResourceColumn::CloudProvider => "cloud_provider",
            ResourceColumn::Engine => "engine",
            ResourceColumn::HealthStatus => "health_status",
        }
    }
}

pub fn insert(
    conn: &Connection,
    new: &NewResource,
    health_score: f64,
    health_status: HealthStatus,
    now: DateTime<Utc>,
) -> SqliteResult<i64> {
    conn.execute(
        "INSERT INTO resources (name, engine, cloud_provider, region, environment,
            cpu_usage, memory_usage, storage_usage, connections_active, connections_max,
            health_score, health_status, monthly_cost, cost_trend, version, instance_type,
            storage_size_gb, active_issue_count, created_at, updated_at, last_seen_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, 0, ?18, ?18, ?18)",
        rusqlite::params![
            new.name,
            new.engine.as_ref(),
            new.cloud_provider.as_ref(),
            new.region,
            new.environment.as_ref(),
            new.cpu_usage,
            new.memory_usage,
            new.storage_usage,
            new.connections_active,
            new.connections_max,
            health_score,
            health_status.as_ref(),
            new.monthly_cost,
            new.cost_trend,
            new.version,
            new.instance_type,
            new.storage_size_gb,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> SqliteResult<Option<Resource>> {
    conn.query_row(
        &format!("SELECT {} FROM resources WHERE id = ?1", RESOURCE_COLUMNS),
        [id],
        row_to_resource,
    )
    .optional()
}

/// Point lookup that treats a missing row as `NotFound`.
pub fn require(conn: &Connection, id: i64) -> FleetResult<Resource> {
    get(conn, id)?.ok_or_else(|| FleetError::not_found("Resource", id))
}

pub fn list(conn: &Connection, filter: &ResourceFilter) -> SqliteResult<Vec<Resource>> {
    let mut sql = format!("SELECT {} FROM resources WHERE 1=1", RESOURCE_COLUMNS);
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(cloud) = filter.cloud_provider {
        params.push(Box::new(cloud.as_ref().to_string()));
        sql.push_str(&format!(" AND cloud_provider = ?{}", params.len()));
    }
    if let Some(engine) = filter.engine {
        params.push(Box::new(engine.as_ref().to_string()));
        sql.push_str(&format!(" AND engine = ?{}", params.len()));
    }
    if let Some(env) = filter.environment {
        params.push(Box::new(env.as_ref().to_string()));
        sql.push_str(&format!(" AND environment = ?{}", params.len()));
    }
    if let Some(status) = filter.health_status {
        params.push(Box::new(status.as_ref().to_string()));
        sql.push_str(&format!(" AND health_status = ?{}", params.len()));
    }
    if let Some(ref region) = filter.region {
        params.push(Box::new(region.clone()));
        sql.push_str(&format!(" AND region = ?{}", params.len()));
    }
    if let Some(ref search) = filter.search {
        params.push(Box::new(format!("%{}%", search.to_lowercase())));
        sql.push_str(&format!(" AND LOWER(name) LIKE ?{}", params.len()));
    }

    params.push(Box::new(page_size(filter.limit, 100)));
    sql.push_str(&format!(" ORDER BY name ASC, id ASC LIMIT ?{}", params.len()));

    let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_ref.as_slice(), row_to_resource)?;
    rows.collect()
}

pub fn list_all(conn: &Connection) -> SqliteResult<Vec<Resource>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM resources ORDER BY id ASC",
        RESOURCE_COLUMNS
    ))?;
    let rows = stmt.query_map([], row_to_resource)?;
    rows.collect()
}

pub fn delete(conn: &Connection, id: i64) -> SqliteResult<bool> {
    let rows = conn.execute("DELETE FROM resources WHERE id = ?1", [id])?;
    Ok(rows > 0)
}

/// Persist a new telemetry snapshot together with its derived health.
pub fn update_snapshot(
    conn: &Connection,
    id: i64,
    snapshot: &TelemetrySnapshot,
    health_score: f64,
    health_status: HealthStatus,
    now: DateTime<Utc>,
) -> SqliteResult<bool> {
    let rows = conn.execute(
        "UPDATE resources SET cpu_usage = ?1, memory_usage = ?2, storage_usage = ?3,
            connections_active = ?4, health_score = ?5, health_status = ?6,
            updated_at = ?7, last_seen_at = ?7
         WHERE id = ?8",
        rusqlite::params![
            snapshot.cpu_usage,
            snapshot.memory_usage,
            snapshot.storage_usage,
            snapshot.connections_active,
            health_score,
            health_status.as_ref(),
            now,
            id,
        ],
    )?;
    Ok(rows > 0)
}

pub fn increment_issue_count(conn: &Connection, id: i64) -> SqliteResult<bool> {
    let rows = conn.execute(
        "UPDATE resources SET active_issue_count = active_issue_count + 1 WHERE id = ?1",
        [id],
    )?;
    Ok(rows > 0)
}

/// Decrement with a floor at zero.
pub fn decrement_issue_count(conn: &Connection, id: i64) -> SqliteResult<bool> {
    let rows = conn.execute(
        "UPDATE resources SET active_issue_count = MAX(active_issue_count - 1, 0) WHERE id = ?1",
        [id],
    )?;
    Ok(rows > 0)
}

pub fn set_monthly_cost(conn: &Connection, id: i64, monthly_cost: f64, now: DateTime<Utc>) -> SqliteResult<bool> {
    let rows = conn.execute(
        "UPDATE resources SET monthly_cost = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![monthly_cost, now, id],
    )?;
    Ok(rows > 0)
}

pub fn count(conn: &Connection) -> SqliteResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))
}

pub fn count_grouped(conn: &Connection, column: ResourceColumn) -> SqliteResult<BTreeMap<String, i64>> {
    let col = column.sql();
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, COUNT(*) FROM resources GROUP BY {}",
        col, col
    ))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    rows.collect()
}

/// Fleet-wide (sum of monthly cost, average cost trend).
pub fn cost_totals(conn: &Connection) -> SqliteResult<(f64, f64)> {
    conn.query_row(
        "SELECT COALESCE(SUM(monthly_cost), 0.0), COALESCE(AVG(cost_trend), 0.0) FROM resources",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

fn row_to_resource(row: &rusqlite::Row) -> SqliteResult<Resource> {
    Ok(Resource {
        id: row.get(0)?,
        name: row.get(1)?,
        engine: parse_enum(2, row.get(2)?)?,
        cloud_provider: parse_enum(3, row.get(3)?)?,
        region: row.get(4)?,
        environment: parse_enum(5, row.get(5)?)?,
        cpu_usage: row.get(6)?,
        memory_usage: row.get(7)?,
        storage_usage: row.get(8)?,
        connections_active: row.get(9)?,
        connections_max: row.get(10)?,
        health_score: row.get(11)?,
        health_status: parse_enum(12, row.get(12)?)?,
        monthly_cost: row.get(13)?,
        cost_trend: row.get(14)?,
        version: row.get(15)?,
        instance_type: row.get(16)?,
        storage_size_gb: row.get(17)?,
        active_issue_count: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
        last_seen_at: row.get(21)?,
    })
}
