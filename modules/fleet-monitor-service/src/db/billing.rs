//! Daily billing records and the window aggregates built on them.

use chrono::{DateTime, NaiveDate, Utc};
use fleet_monitor_types::*;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};

const BILLING_COLUMNS: &str = "id, resource_id, billing_date, total_cost, compute_cost, storage_cost,
    backup_cost, data_transfer_cost, other_cost, currency, billing_source, created_at";

/// Insert or replace the record for `(resource_id, billing_date)`.
pub fn upsert(conn: &Connection, record: &NewBillingRecord, now: DateTime<Utc>) -> SqliteResult<i64> {
    conn.execute(
        "INSERT INTO billing_records (resource_id, billing_date, total_cost, compute_cost,
            storage_cost, backup_cost, data_transfer_cost, other_cost, currency,
            billing_source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(resource_id, billing_date) DO UPDATE SET
            total_cost = excluded.total_cost,
            compute_cost = excluded.compute_cost,
            storage_cost = excluded.storage_cost,
            backup_cost = excluded.backup_cost,
            data_transfer_cost = excluded.data_transfer_cost,
            other_cost = excluded.other_cost,
            currency = excluded.currency,
            billing_source = excluded.billing_source",
        rusqlite::params![
            record.resource_id,
            record.billing_date,
            record.total_cost,
            record.components.compute,
            record.components.storage,
            record.components.backup,
            record.components.data_transfer,
            record.components.other,
            record.currency,
            record.billing_source,
            now,
        ],
    )?;
    conn.query_row(
        "SELECT id FROM billing_records WHERE resource_id = ?1 AND billing_date = ?2",
        rusqlite::params![record.resource_id, record.billing_date],
        |row| row.get(0),
    )
}

pub fn get(conn: &Connection, id: i64) -> SqliteResult<Option<BillingRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM billing_records WHERE id = ?1", BILLING_COLUMNS),
        [id],
        row_to_record,
    )
    .optional()
}

/// One resource's records inside the window, newest first.
pub fn list_for_resource(conn: &Connection, resource_id: i64, window: &CostWindow) -> SqliteResult<Vec<BillingRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM billing_records
         WHERE resource_id = ?1 AND billing_date >= ?2 AND billing_date <= ?3
         ORDER BY billing_date DESC",
        BILLING_COLUMNS
    ))?;
    let rows = stmt.query_map(
        rusqlite::params![resource_id, window.start, window.end],
        row_to_record,
    )?;
    rows.collect()
}

/// Fleet-wide total inside the window.
pub fn total_in(conn: &Connection, window: &CostWindow) -> SqliteResult<f64> {
    conn.query_row(
        "SELECT COALESCE(SUM(total_cost), 0.0) FROM billing_records
         WHERE billing_date >= ?1 AND billing_date <= ?2",
        rusqlite::params![window.start, window.end],
        |row| row.get(0),
    )
}

/// Fleet-wide component sums inside the window.
pub fn components_in(conn: &Connection, window: &CostWindow) -> SqliteResult<CostComponents> {
    conn.query_row(
        "SELECT COALESCE(SUM(compute_cost), 0.0), COALESCE(SUM(storage_cost), 0.0),
                COALESCE(SUM(backup_cost), 0.0), COALESCE(SUM(data_transfer_cost), 0.0),
                COALESCE(SUM(other_cost), 0.0)
         FROM billing_records
         WHERE billing_date >= ?1 AND billing_date <= ?2",
        rusqlite::params![window.start, window.end],
        |row| {
            Ok(CostComponents {
                compute: row.get(0)?,
                storage: row.get(1)?,
                backup: row.get(2)?,
                data_transfer: row.get(3)?,
                other: row.get(4)?,
            })
        },
    )
}

/// `(key, total, distinct resources)` grouped by a resource attribute, largest total first.
pub fn grouped_totals(conn: &Connection, key: BreakdownKey, window: &CostWindow) -> SqliteResult<Vec<(String, f64, i64)>> {
    let column = match key {
        BreakdownKey::Cloud => "r.cloud_provider",
        BreakdownKey::Type => "r.engine",
        BreakdownKey::Region => "r.region",
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {col}, SUM(b.total_cost), COUNT(DISTINCT b.resource_id)
         FROM billing_records b
         JOIN resources r ON r.id = b.resource_id
         WHERE b.billing_date >= ?1 AND b.billing_date <= ?2
         GROUP BY {col}
         ORDER BY SUM(b.total_cost) DESC, {col} ASC",
        col = column
    ))?;
    let rows = stmt.query_map(rusqlite::params![window.start, window.end], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    rows.collect()
}

/// Per-day fleet totals for days that have at least one record.
pub fn daily_totals(conn: &Connection, window: &CostWindow) -> SqliteResult<Vec<(NaiveDate, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT billing_date, SUM(total_cost) FROM billing_records
         WHERE billing_date >= ?1 AND billing_date <= ?2
         GROUP BY billing_date
         ORDER BY billing_date ASC",
    )?;
    let rows = stmt.query_map(rusqlite::params![window.start, window.end], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    rows.collect()
}

fn row_to_record(row: &rusqlite::Row) -> SqliteResult<BillingRecord> {
    Ok(BillingRecord {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        billing_date: row.get(2)?,
        total_cost: row.get(3)?,
        components: CostComponents {
            compute: row.get(4)?,
            storage: row.get(5)?,
            backup: row.get(6)?,
            data_transfer: row.get(7)?,
            other: row.get(8)?,
        },
        currency: row.get(9)?,
        billing_source: row.get(10)?,
        created_at: row.get(11)?,
    })
}
