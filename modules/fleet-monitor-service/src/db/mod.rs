//! SQLite store for the fleet monitor service.
//!
//! All access goes through [`Db::read`] or [`Db::transaction`]. The single connection sits
//! behind a mutex, so each transaction is serialised against every other operation; the
//! per-table helpers take a plain `&Connection` so they compose inside one transaction.

pub mod anomalies;
pub mod billing;
pub mod changes;
pub mod issues;
pub mod metrics;
pub mod resources;

use crate::error::{FleetError, FleetResult};
use parking_lot::Mutex;
use rusqlite::{Connection, Result as SqliteResult, TransactionBehavior};
use std::str::FromStr;

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> SqliteResult<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                engine TEXT NOT NULL,
                cloud_provider TEXT NOT NULL,
                region TEXT NOT NULL,
                environment TEXT NOT NULL,
                cpu_usage REAL NOT NULL DEFAULT 0.0,
                memory_usage REAL NOT NULL DEFAULT 0.0,
                storage_usage REAL NOT NULL DEFAULT 0.0,
                connections_active INTEGER NOT NULL DEFAULT 0,
                connections_max INTEGER NOT NULL DEFAULT 100,
                health_score REAL NOT NULL DEFAULT 100.0,
                health_status TEXT NOT NULL DEFAULT 'healthy',
                monthly_cost REAL NOT NULL DEFAULT 0.0,
                cost_trend REAL NOT NULL DEFAULT 0.0,
                version TEXT,
                instance_type TEXT,
                storage_size_gb INTEGER,
                active_issue_count INTEGER NOT NULL DEFAULT 0 CHECK (active_issue_count >= 0),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_resources_name ON resources(name)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS issues (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                severity TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                ai_explanation TEXT,
                ai_recommendations_json TEXT,
                occurrence_count INTEGER NOT NULL DEFAULT 1 CHECK (occurrence_count >= 1),
                first_detected_at TEXT NOT NULL,
                last_detected_at TEXT NOT NULL,
                acknowledged_at TEXT,
                acknowledged_by TEXT,
                resolved_at TEXT,
                resolved_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (resource_id) REFERENCES resources(id) ON DELETE CASCADE
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_issues_dedup ON issues(resource_id, title, status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status, last_detected_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS billing_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id INTEGER NOT NULL,
                billing_date TEXT NOT NULL,
                total_cost REAL NOT NULL,
                compute_cost REAL NOT NULL DEFAULT 0.0,
                storage_cost REAL NOT NULL DEFAULT 0.0,
                backup_cost REAL NOT NULL DEFAULT 0.0,
                data_transfer_cost REAL NOT NULL DEFAULT 0.0,
                other_cost REAL NOT NULL DEFAULT 0.0,
                currency TEXT NOT NULL DEFAULT 'USD',
                billing_source TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (resource_id) REFERENCES resources(id) ON DELETE CASCADE,
                UNIQUE(resource_id, billing_date)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_billing_date ON billing_records(billing_date)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cost_anomalies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id INTEGER,
                anomaly_type TEXT NOT NULL,
                amount REAL NOT NULL,
                baseline_amount REAL NOT NULL,
                deviation_percent REAL NOT NULL,
                explanation TEXT,
                possible_causes_json TEXT,
                detected_at TEXT NOT NULL,
                is_acknowledged INTEGER NOT NULL DEFAULT 0,
                acknowledged_by TEXT,
                acknowledged_at TEXT,
                FOREIGN KEY (resource_id) REFERENCES resources(id) ON DELETE SET NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_anomalies_detected ON cost_anomalies(detected_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS change_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id INTEGER NOT NULL,
                change_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                author TEXT,
                source TEXT,
                impact TEXT,
                executed_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (resource_id) REFERENCES resources(id) ON DELETE CASCADE
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_changes_executed ON change_events(executed_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metric_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT,
                recorded_at TEXT NOT NULL,
                FOREIGN KEY (resource_id) REFERENCES resources(id) ON DELETE CASCADE
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_metrics_series ON metric_samples(resource_id, name, recorded_at)",
            [],
        )?;

        Ok(())
    }

    /// Run read-only queries against the connection.
    pub fn read<T, F>(&self, f: F) -> FleetResult<T>
    where
        F: FnOnce(&Connection) -> FleetResult<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside one immediate transaction. Any error rolls the whole unit back.
    pub fn transaction<T, F>(&self, f: F) -> FleetResult<T>
    where
        F: FnOnce(&Connection) -> FleetResult<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Decode a snake_case enum column.
pub(crate) fn parse_enum<T>(idx: usize, raw: String) -> SqliteResult<T>
where
    T: FromStr<Err = strum::ParseError>,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Decode a JSON string-list column; NULL reads as empty.
pub(crate) fn parse_string_list(idx: usize, raw: Option<String>) -> SqliteResult<Vec<String>> {
    match raw {
        None => Ok(Vec::new()),
        Some(s) => serde_json::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}

pub(crate) fn encode_string_list(items: &[String]) -> FleetResult<String> {
    serde_json::to_string(items).map_err(|e| FleetError::validation(e.to_string()))
}

/// Clamp a caller-provided limit into a sane page size.
pub(crate) fn page_size(limit: Option<usize>, default: usize) -> i64 {
    limit.unwrap_or(default).clamp(1, 1000) as i64
}
