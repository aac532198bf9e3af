//! Demo fleet for an empty store.
//!
//! Everything is written in one transaction. Issues go through the lifecycle helpers so the
//! per-resource counters are correct from the start.

use crate::cost;
use crate::db::{self, Db};
use crate::error::FleetResult;
use crate::health;
use crate::lifecycle::{self, ISSUE_TEMPLATES};
use chrono::{Duration, Utc};
use fleet_monitor_types::*;
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::Connection;
use strum::IntoEnumIterator;

pub const DEFAULT_FLEET_SIZE: usize = 16;

const RESOURCE_NAMES: [&str; 16] = [
    "users-primary",
    "orders-db",
    "inventory-master",
    "analytics-warehouse",
    "sessions-cache",
    "payments-db",
    "notifications-db",
    "audit-logs",
    "products-catalog",
    "search-index",
    "metrics-store",
    "config-db",
    "auth-db",
    "billing-db",
    "reports-db",
    "events-stream",
];

const CLOUDS: [CloudProvider; 3] = [CloudProvider::Aws, CloudProvider::Gcp, CloudProvider::Azure];

const ENGINES: [EngineType; 6] = [
    EngineType::Postgres,
    EngineType::Mysql,
    EngineType::Mongodb,
    EngineType::Redis,
    EngineType::Dynamodb,
    EngineType::Aurora,
];

const CHANGE_TEMPLATES: [(&str, ChangeType, &str); 5] = [
    ("Configuration update", ChangeType::ConfigChange, "Updated max_connections parameter"),
    ("Version upgrade", ChangeType::VersionUpgrade, "Upgraded database version"),
    ("Scaling event", ChangeType::Scaling, "Increased instance size due to load"),
    ("Maintenance window", ChangeType::Maintenance, "Scheduled maintenance completed"),
    ("Failover event", ChangeType::Failover, "Automatic failover to replica"),
];

const CHANGE_AUTHORS: [&str; 3] = ["system", "admin@company.com", "devops@company.com"];
const CHANGE_SOURCES: [&str; 3] = ["console", "api", "automation"];

const BILLING_DAYS: i64 = 30;
const SAMPLE_HOURS: i64 = 24;
const SEEDED_ANOMALIES: usize = 3;
const MAX_CHANGES_PER_RESOURCE: usize = 3;
const CHANGE_HISTORY_DAYS: i64 = 14;

fn regions_for(cloud: CloudProvider) -> &'static [&'static str] {
    match cloud {
        CloudProvider::Aws => &["us-east-1", "us-west-2", "eu-west-1", "ap-southeast-1"],
        CloudProvider::Gcp => &["us-central1", "europe-west1", "asia-east1"],
        CloudProvider::Azure => &["eastus", "westeurope", "southeastasia"],
    }
}

fn base_cost(engine: EngineType) -> f64 {
    match engine {
        EngineType::Postgres => 150.0,
        EngineType::Mysql => 120.0,
        EngineType::Mongodb => 180.0,
        EngineType::Redis => 80.0,
        EngineType::Dynamodb => 200.0,
        EngineType::Aurora => 250.0,
    }
}

fn environment_multiplier(env: Environment) -> f64 {
    match env {
        Environment::Production => 2.0,
        Environment::Staging => 1.0,
        Environment::Development => 0.5,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub resources: usize,
    pub issues: usize,
    pub billing_records: usize,
    pub anomalies: usize,
    pub samples: usize,
    pub changes: usize,
}

/// Seed `count` resources plus their issues, billing history, change events, anomalies and
/// samples.
/// Returns `None` when the store already holds resources.
pub fn seed_fleet<R: Rng>(db: &Db, rng: &mut R, count: usize) -> FleetResult<Option<SeedReport>> {
    db.transaction(|tx| {
        if db::resources::count(tx)? > 0 {
            log::info!("[SEED] Store already has resources, skipping seed");
            return Ok(None);
        }
        let report = seed_in(tx, rng, count)?;
        log::info!(
            "[SEED] Seeded {} resources, {} issues, {} billing records, {} changes, {} anomalies, {} samples",
            report.resources,
            report.issues,
            report.billing_records,
            report.changes,
            report.anomalies,
            report.samples
        );
        Ok(Some(report))
    })
}

fn seed_in<R: Rng>(conn: &Connection, rng: &mut R, count: usize) -> FleetResult<SeedReport> {
    let now = Utc::now();
    let today = now.date_naive();
    let mut report = SeedReport::default();
    let mut resource_ids = Vec::with_capacity(count);
    let anomaly_types: Vec<CostAnomalyType> = CostAnomalyType::iter().collect();
    let impacts: Vec<ChangeImpact> = ChangeImpact::iter().collect();

    for i in 0..count {
        let new = random_resource(rng, i);
        let assessed = health::score(&TelemetrySnapshot {
            cpu_usage: new.cpu_usage,
            memory_usage: new.memory_usage,
            storage_usage: new.storage_usage,
            connections_active: new.connections_active,
            connections_max: new.connections_max,
        });
        let id = db::resources::insert(conn, &new, assessed.score, assessed.status, now)?;
        resource_ids.push(id);
        report.resources += 1;

        // Busier resources collect more issues
        let issue_count = match new.cpu_usage {
            c if c >= 80.0 => rng.gen_range(2..=4),
            c if c >= 50.0 => rng.gen_range(1..=2),
            _ => rng.gen_range(0..=1),
        };
        for _ in 0..issue_count {
            let Some(entry) = ISSUE_TEMPLATES.choose(rng) else {
                continue;
            };
            let detection = lifecycle::create_or_bump_in(conn, id, &entry.to_template(), now)?;
            if detection.created {
                report.issues += 1;
                if rng.gen_bool(0.3) {
                    lifecycle::acknowledge_in(conn, detection.issue.id, "oncall", now)?;
                }
            }
        }

        let daily = new.monthly_cost / cost::DAYS_PER_MONTH;
        for days_ago in 0..BILLING_DAYS {
            let total = daily * rng.gen_range(0.85..1.15);
            let record = NewBillingRecord {
                resource_id: id,
                billing_date: today - Duration::days(days_ago),
                total_cost: total,
                components: CostComponents {
                    compute: total * 0.6,
                    storage: total * 0.25,
                    backup: total * 0.05,
                    data_transfer: total * 0.08,
                    other: total * 0.02,
                },
                currency: "USD".to_string(),
                billing_source: Some(new.cloud_provider.to_string()),
            };
            db::billing::upsert(conn, &record, now)?;
            report.billing_records += 1;
        }

        for _ in 0..rng.gen_range(0..=MAX_CHANGES_PER_RESOURCE) {
            let Some(&(title, change_type, description)) = CHANGE_TEMPLATES.choose(rng) else {
                continue;
            };
            let change = NewChangeEvent {
                resource_id: id,
                change_type,
                title: title.to_string(),
                description: Some(description.to_string()),
                author: CHANGE_AUTHORS.choose(rng).map(|a| a.to_string()),
                source: CHANGE_SOURCES.choose(rng).map(|s| s.to_string()),
                impact: impacts.choose(rng).copied(),
                executed_at: now - Duration::days(rng.gen_range(0..=CHANGE_HISTORY_DAYS)),
            };
            db::changes::insert(conn, &change, now)?;
            report.changes += 1;
        }

        for hours_ago in 0..SAMPLE_HOURS {
            let at = now - Duration::hours(hours_ago);
            for (name, base, unit) in [
                ("cpu_usage", new.cpu_usage, "%"),
                ("memory_usage", new.memory_usage, "%"),
                ("storage_usage", new.storage_usage, "%"),
                ("connections", new.connections_active as f64, "count"),
            ] {
                let mut value = base * rng.gen_range(0.9..1.1);
                if unit == "%" {
                    value = value.clamp(0.0, 100.0);
                }
                db::metrics::insert(conn, id, name, health::round2(value), Some(unit), at)?;
                report.samples += 1;
            }
        }
    }

    for _ in 0..SEEDED_ANOMALIES {
        let (Some(&resource_id), Some(&anomaly_type)) =
            (resource_ids.choose(rng), anomaly_types.choose(rng))
        else {
            break;
        };
        let resource = db::resources::require(conn, resource_id)?;
        let deviation = rng.gen_range(30.0..150.0);
        let amount = resource.monthly_cost / cost::DAYS_PER_MONTH * (1.0 + deviation / 100.0);
        let detected_at = now - Duration::days(rng.gen_range(0..=7));
        cost::detect_anomaly_in(conn, resource_id, amount, anomaly_type, detected_at)?;
        report.anomalies += 1;
    }

    Ok(report)
}

fn random_resource<R: Rng>(rng: &mut R, index: usize) -> NewResource {
    let base_name = RESOURCE_NAMES[index % RESOURCE_NAMES.len()];
    let cloud = CLOUDS[rng.gen_range(0..CLOUDS.len())];
    let regions = regions_for(cloud);
    let region = regions[rng.gen_range(0..regions.len())];
    let engine = ENGINES[rng.gen_range(0..ENGINES.len())];

    let env_roll: f64 = rng.r#gen();
    let environment = if env_roll < 0.4 {
        Environment::Production
    } else if env_roll < 0.7 {
        Environment::Staging
    } else {
        Environment::Development
    };

    // 60% healthy, 25% warning, 15% critical telemetry profiles
    let profile_roll: f64 = rng.r#gen();
    let (cpu, memory, storage) = if profile_roll < 0.60 {
        (rng.gen_range(10.0..50.0), rng.gen_range(20.0..60.0), rng.gen_range(20.0..60.0))
    } else if profile_roll < 0.85 {
        (rng.gen_range(50.0..80.0), rng.gen_range(60.0..85.0), rng.gen_range(60.0..80.0))
    } else {
        (rng.gen_range(80.0..98.0), rng.gen_range(85.0..98.0), rng.gen_range(80.0..95.0))
    };

    let monthly_cost = base_cost(engine) * environment_multiplier(environment) * rng.gen_range(0.8..1.5);

    NewResource {
        name: format!("{}-{:02}", base_name, index + 1),
        engine,
        cloud_provider: cloud,
        region: region.to_string(),
        environment,
        cpu_usage: health::round2(cpu),
        memory_usage: health::round2(memory),
        storage_usage: health::round2(storage),
        connections_active: rng.gen_range(10..=90),
        connections_max: 100,
        monthly_cost: health::round2(monthly_cost),
        cost_trend: health::round2(rng.gen_range(-15.0..20.0)),
        version: Some(format!("{}.{}", rng.gen_range(12..=16), rng.gen_range(0..=9))),
        instance_type: Some(format!(
            "db.r5.{}",
            ["large", "xlarge", "2xlarge"][rng.gen_range(0..3)]
        )),
        storage_size_gb: Some([100, 200, 500, 1000][rng.gen_range(0..4)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_seed_populates_consistent_fleet() {
        let db = Db::open(":memory:").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let report = seed_fleet(&db, &mut rng, DEFAULT_FLEET_SIZE).unwrap().unwrap();

        assert_eq!(report.resources, 16);
        assert_eq!(report.billing_records, 16 * 30);
        assert_eq!(report.samples, 16 * 24 * 4);
        assert_eq!(report.anomalies, 3);
        assert!(report.changes <= 16 * 3);
        assert!(lifecycle::counter_drift(&db).unwrap().is_empty());

        let exec = crate::overview::executive_summary(&db).unwrap();
        assert_eq!(exec.recent_changes.len(), report.changes.min(5));
        for pair in exec.recent_changes.windows(2) {
            assert!(pair[0].executed_at >= pair[1].executed_at);
        }

        let resources = crate::resources::list_resources(&db, &ResourceFilter::default()).unwrap();
        assert_eq!(resources.len(), 16);
        for r in &resources {
            assert_eq!(r.health_score, health::score(&r.snapshot()).score);
        }
    }

    #[test]
    fn test_seed_skips_populated_store() {
        let db = Db::open(":memory:").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        crate::resources::fixtures::resource(&db, "existing");
        assert!(seed_fleet(&db, &mut rng, 4).unwrap().is_none());
        assert_eq!(crate::resources::list_resources(&db, &ResourceFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_seed_billing_components_sum_to_total() {
        let db = Db::open(":memory:").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        seed_fleet(&db, &mut rng, 2).unwrap();
        let today = Utc::now().date_naive();
        let window = CostWindow::ending_on(today, 29);
        let summary = cost::summary(&db, &window).unwrap();
        assert!((summary.breakdown.sum() - summary.total_cost).abs() < 1e-6);
        assert!(summary.total_cost > 0.0);
    }
}
