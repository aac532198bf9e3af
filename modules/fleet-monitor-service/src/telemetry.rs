//! Metric ingestion and time series reads.
//!
//! Every ingested value is appended as a sample. The three snapshot metrics also overwrite
//! the resource's current snapshot, after which health is rescored (without jitter).

use crate::db::{self, Db};
use crate::error::{FleetError, FleetResult};
use crate::health;
use crate::resources::validate_percentage;
use chrono::{DateTime, Utc};
use fleet_monitor_types::*;
use rusqlite::Connection;

/// Metric names that map onto a resource's snapshot fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotField {
    Cpu,
    Memory,
    Storage,
}

impl SnapshotField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "cpu_usage" => Some(SnapshotField::Cpu),
            "memory_usage" => Some(SnapshotField::Memory),
            "storage_usage" => Some(SnapshotField::Storage),
            _ => None,
        }
    }

    fn apply(&self, snapshot: &mut TelemetrySnapshot, value: f64) {
        match self {
            SnapshotField::Cpu => snapshot.cpu_usage = value,
            SnapshotField::Memory => snapshot.memory_usage = value,
            SnapshotField::Storage => snapshot.storage_usage = value,
        }
    }
}

pub fn ingest_metric(db: &Db, req: &IngestMetricRequest) -> FleetResult<MetricSample> {
    validate_reading(&req.name, req.value)?;
    db.transaction(|tx| {
        let now = Utc::now();
        let recorded_at = req.timestamp.unwrap_or(now);
        let resource = db::resources::require(tx, req.resource_id)?;
        let id = db::metrics::insert(tx, req.resource_id, &req.name, req.value, req.unit.as_deref(), recorded_at)?;
        apply_readings(tx, &resource, std::iter::once((req.name.as_str(), req.value)), now)?;
        Ok(MetricSample {
            id,
            resource_id: req.resource_id,
            name: req.name.clone(),
            value: req.value,
            unit: req.unit.clone(),
            recorded_at,
        })
    })
}

/// All readings land in one transaction; one bad reading rejects the batch.
pub fn ingest_batch(db: &Db, req: &IngestBatchRequest) -> FleetResult<BatchIngestResult> {
    for reading in &req.metrics {
        validate_reading(&reading.name, reading.value)?;
    }
    db.transaction(|tx| {
        let now = Utc::now();
        let recorded_at = req.timestamp.unwrap_or(now);
        let resource = db::resources::require(tx, req.resource_id)?;
        for reading in &req.metrics {
            db::metrics::insert(
                tx,
                req.resource_id,
                &reading.name,
                reading.value,
                reading.unit.as_deref(),
                recorded_at,
            )?;
        }
        apply_readings(
            tx,
            &resource,
            req.metrics.iter().map(|r| (r.name.as_str(), r.value)),
            now,
        )?;
        Ok(BatchIngestResult {
            metrics_ingested: req.metrics.len(),
        })
    })
}

fn apply_readings<'a>(
    conn: &Connection,
    resource: &Resource,
    readings: impl Iterator<Item = (&'a str, f64)>,
    now: DateTime<Utc>,
) -> FleetResult<()> {
    let mut snapshot = resource.snapshot();
    let mut touched = false;
    for (name, value) in readings {
        if let Some(field) = SnapshotField::from_name(name) {
            field.apply(&mut snapshot, value);
            touched = true;
        }
    }
    if !touched {
        return Ok(());
    }
    let assessed = health::score(&snapshot);
    db::resources::update_snapshot(conn, resource.id, &snapshot, assessed.score, assessed.status, now)?;
    Ok(())
}

fn validate_reading(name: &str, value: f64) -> FleetResult<()> {
    if name.trim().is_empty() {
        return Err(FleetError::validation("metric name must not be empty"));
    }
    if !value.is_finite() {
        return Err(FleetError::validation(format!("{} must be a finite number", name)));
    }
    if SnapshotField::from_name(name).is_some() {
        validate_percentage(name, value)?;
    }
    Ok(())
}

/// Samples of one metric inside the look-back window, with min/max/avg (0 when empty).
pub fn metric_series(db: &Db, req: &MetricSeriesRequest) -> FleetResult<MetricSeries> {
    let since = Utc::now() - req.window.duration();
    let samples = db.read(|conn| {
        db::resources::require(conn, req.resource_id)?;
        Ok(db::metrics::series(conn, req.resource_id, &req.name, since)?)
    })?;

    let unit = samples.first().and_then(|s| s.unit.clone());
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let (min_value, max_value, avg_value) = if values.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        (min, max, avg)
    };

    Ok(MetricSeries {
        resource_id: req.resource_id,
        name: req.name.clone(),
        unit,
        points: samples
            .into_iter()
            .map(|s| MetricDataPoint {
                timestamp: s.recorded_at,
                value: s.value,
            })
            .collect(),
        min_value,
        max_value,
        avg_value,
    })
}

pub fn available_metrics(db: &Db, resource_id: i64) -> FleetResult<Vec<String>> {
    db.read(|conn| {
        db::resources::require(conn, resource_id)?;
        Ok(db::metrics::distinct_names(conn, resource_id)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{fixtures, get_resource};
    use chrono::Duration;

    fn reading(name: &str, value: f64, unit: &str) -> MetricReading {
        MetricReading {
            name: name.to_string(),
            value,
            unit: Some(unit.to_string()),
        }
    }

    #[test]
    fn test_snapshot_metric_updates_health() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "orders-db");

        ingest_metric(&db, &IngestMetricRequest {
            resource_id: res.id,
            name: "cpu_usage".to_string(),
            value: 95.0,
            unit: Some("%".to_string()),
            timestamp: None,
        })
        .unwrap();

        let updated = get_resource(&db, res.id).unwrap();
        assert_eq!(updated.cpu_usage, 95.0);
        let expected = health::score(&updated.snapshot());
        assert_eq!(updated.health_score, expected.score);
        assert!(updated.health_score < res.health_score);
    }

    #[test]
    fn test_unrecognised_metric_only_appends_sample() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "orders-db");
        ingest_metric(&db, &IngestMetricRequest {
            resource_id: res.id,
            name: "replication_lag_ms".to_string(),
            value: 1250.0,
            unit: Some("ms".to_string()),
            timestamp: None,
        })
        .unwrap();

        let after = get_resource(&db, res.id).unwrap();
        assert_eq!(after.health_score, res.health_score);
        assert_eq!(available_metrics(&db, res.id).unwrap(), vec!["replication_lag_ms"]);
    }

    #[test]
    fn test_batch_is_atomic() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "orders-db");
        let bad = IngestBatchRequest {
            resource_id: res.id,
            metrics: vec![reading("cpu_usage", 50.0, "%"), reading("memory_usage", 140.0, "%")],
            timestamp: None,
        };
        assert!(matches!(ingest_batch(&db, &bad), Err(FleetError::Validation(_))));
        assert!(available_metrics(&db, res.id).unwrap().is_empty());

        let good = IngestBatchRequest {
            resource_id: res.id,
            metrics: vec![
                reading("cpu_usage", 10.0, "%"),
                reading("memory_usage", 20.0, "%"),
                reading("connections", 12.0, "count"),
            ],
            timestamp: None,
        };
        assert_eq!(ingest_batch(&db, &good).unwrap().metrics_ingested, 3);
        let after = get_resource(&db, res.id).unwrap();
        assert_eq!(after.cpu_usage, 10.0);
        assert_eq!(after.memory_usage, 20.0);
        assert_eq!(
            available_metrics(&db, res.id).unwrap(),
            vec!["connections", "cpu_usage", "memory_usage"]
        );
    }

    #[test]
    fn test_series_window_and_stats() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "orders-db");
        let now = Utc::now();
        for (age_hours, value) in [(30, 99.0), (3, 20.0), (2, 40.0), (1, 60.0)] {
            ingest_metric(&db, &IngestMetricRequest {
                resource_id: res.id,
                name: "cpu_usage".to_string(),
                value,
                unit: Some("%".to_string()),
                timestamp: Some(now - Duration::hours(age_hours)),
            })
            .unwrap();
        }

        let series = metric_series(&db, &MetricSeriesRequest {
            resource_id: res.id,
            name: "cpu_usage".to_string(),
            window: MetricWindow::Day,
        })
        .unwrap();
        let values: Vec<f64> = series.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![20.0, 40.0, 60.0]);
        assert_eq!(series.min_value, 20.0);
        assert_eq!(series.max_value, 60.0);
        assert_eq!(series.avg_value, 40.0);
        assert_eq!(series.unit.as_deref(), Some("%"));

        let empty = metric_series(&db, &MetricSeriesRequest {
            resource_id: res.id,
            name: "memory_usage".to_string(),
            window: MetricWindow::OneHour,
        })
        .unwrap();
        assert!(empty.points.is_empty());
        assert_eq!(empty.avg_value, 0.0);
    }

    #[test]
    fn test_missing_resource() {
        let db = Db::open(":memory:").unwrap();
        let req = IngestMetricRequest {
            resource_id: 9,
            name: "cpu_usage".to_string(),
            value: 1.0,
            unit: None,
            timestamp: None,
        };
        assert!(matches!(ingest_metric(&db, &req), Err(FleetError::NotFound { .. })));
        assert!(matches!(available_metrics(&db, 9), Err(FleetError::NotFound { .. })));
    }
}
