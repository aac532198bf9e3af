//! Change event rows.

use super::parse_enum;
use chrono::{DateTime, Utc};
use fleet_monitor_types::*;
use rusqlite::{Connection, Result as SqliteResult};

const CHANGE_COLUMNS: &str = "id, resource_id, change_type, title, description, author, source,
    impact, executed_at, created_at";

pub fn insert(conn: &Connection, change: &NewChangeEvent, now: DateTime<Utc>) -> SqliteResult<i64> {
    conn.execute(
        "INSERT INTO change_events (resource_id, change_type, title, description, author, source,
            impact, executed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            change.resource_id,
            change.change_type.as_ref(),
            change.title,
            change.description,
            change.author,
            change.source,
            change.impact.map(|i| i.as_ref().to_string()),
            change.executed_at,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fleet-wide, most recently executed first.
pub fn recent(conn: &Connection, limit: i64) -> SqliteResult<Vec<ChangeEvent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM change_events ORDER BY executed_at DESC, id DESC LIMIT ?1",
        CHANGE_COLUMNS
    ))?;
    let rows = stmt.query_map([limit], row_to_change)?;
    rows.collect()
}

fn row_to_change(row: &rusqlite::Row) -> SqliteResult<ChangeEvent> {
    let impact = match row.get::<_, Option<String>>(7)? {
        Some(raw) => Some(parse_enum(7, raw)?),
        None => None,
    };
    Ok(ChangeEvent {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        change_type: parse_enum(2, row.get(2)?)?,
        title: row.get(3)?,
        description: row.get(4)?,
        author: row.get(5)?,
        source: row.get(6)?,
        impact,
        executed_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}
