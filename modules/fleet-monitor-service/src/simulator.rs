//! Synthetic telemetry loop.
//!
//! One tick perturbs every resource's snapshot, then may open an issue, auto-resolve one, and
//! (every few ticks) record a cost anomaly. Each sub-step is its own transaction; the first
//! failing sub-step ends the tick and the loop carries on with the next one. Ticks never
//! overlap and the loop only stops while sleeping between ticks.

use crate::cost::{self, AnomalySignal, AnomalyTrigger};
use crate::db::{self, Db};
use crate::error::FleetResult;
use crate::health;
use crate::lifecycle::{self, ISSUE_TEMPLATES};
use chrono::{DateTime, Utc};
use fleet_monitor_types::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strum::IntoEnumIterator;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Actor recorded on issues the simulator resolves.
pub const AUTO_REMEDIATION_ACTOR: &str = "auto-remediation";

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub interval: Duration,
    pub issue_probability: f64,
    pub resolve_probability: f64,
    /// Anomalies are only considered on every n-th tick
    pub anomaly_every_ticks: u64,
    pub anomaly_probability: f64,
    /// Synthetic anomaly deviation range, in percent above baseline
    pub anomaly_deviation: (f64, f64),
    /// Headroom kept below `connections_max`
    pub connection_margin: i64,
    /// Health jitter is drawn from `[-health_jitter, health_jitter]`
    pub health_jitter: f64,
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            issue_probability: 0.3,
            resolve_probability: 0.2,
            anomaly_every_ticks: 3,
            anomaly_probability: 0.1,
            anomaly_deviation: (20.0, 100.0),
            connection_margin: 5,
            health_jitter: 5.0,
            seed: None,
        }
    }
}

/// Shared counters the RPC layer reports from.
#[derive(Debug, Default)]
pub struct SimulatorStats {
    pub ticks_completed: AtomicU64,
    pub last_tick_at: Mutex<Option<String>>,
}

#[derive(Debug, Default, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub resources_updated: usize,
    pub issue_detected: Option<IssueDetection>,
    pub issue_resolved: Option<i64>,
    pub anomaly_recorded: Option<i64>,
}

/// Fires with a fixed probability and reports an amount a random percentage above the
/// resource's daily baseline.
pub struct RandomDeviationTrigger {
    rng: StdRng,
    probability: f64,
    deviation: (f64, f64),
}

impl RandomDeviationTrigger {
    pub fn new(rng: StdRng, probability: f64, deviation: (f64, f64)) -> Self {
        Self {
            rng,
            probability,
            deviation,
        }
    }
}

impl AnomalyTrigger for RandomDeviationTrigger {
    fn evaluate(&mut self, resource: &Resource) -> Option<AnomalySignal> {
        if !self.rng.gen_bool(self.probability.clamp(0.0, 1.0)) {
            return None;
        }
        let types: Vec<CostAnomalyType> = CostAnomalyType::iter().collect();
        let anomaly_type = types[self.rng.gen_range(0..types.len())];
        let (low, high) = self.deviation;
        let deviation = if high > low { self.rng.gen_range(low..high) } else { low };
        let baseline = resource.monthly_cost / cost::DAYS_PER_MONTH;
        Some(AnomalySignal {
            anomaly_type,
            amount: baseline * (1.0 + deviation / 100.0),
        })
    }
}

pub struct Simulator<T: AnomalyTrigger = RandomDeviationTrigger> {
    db: Arc<Db>,
    config: SimulatorConfig,
    rng: StdRng,
    trigger: T,
    tick: u64,
}

impl Simulator<RandomDeviationTrigger> {
    /// A seeded config replays the same random stream; otherwise the stream comes from entropy.
    pub fn new(db: Arc<Db>, config: SimulatorConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let trigger = RandomDeviationTrigger::new(
            StdRng::seed_from_u64(rng.r#gen()),
            config.anomaly_probability,
            config.anomaly_deviation,
        );
        Self::with_trigger(db, config, rng, trigger)
    }
}

impl<T: AnomalyTrigger> Simulator<T> {
    pub fn with_trigger(db: Arc<Db>, config: SimulatorConfig, rng: StdRng, trigger: T) -> Self {
        Self {
            db,
            config,
            rng,
            trigger,
            tick: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn run_tick(&mut self) -> FleetResult<TickReport> {
        self.tick += 1;
        let now = Utc::now();
        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };

        let rng = &mut self.rng;
        let config = &self.config;
        report.resources_updated = self.db.transaction(|tx| perturb_fleet(tx, rng, config, now))?;

        if self.rng.gen_bool(self.config.issue_probability.clamp(0.0, 1.0)) {
            let rng = &mut self.rng;
            report.issue_detected = self.db.transaction(|tx| detect_random_issue(tx, rng, now))?;
            if let Some(ref detection) = report.issue_detected {
                if detection.created {
                    log::info!(
                        "[SIMULATOR] Opened issue #{} '{}' on resource #{}",
                        detection.issue.id,
                        detection.issue.title,
                        detection.issue.resource_id
                    );
                }
            }
        }

        if self.rng.gen_bool(self.config.resolve_probability.clamp(0.0, 1.0)) {
            let rng = &mut self.rng;
            report.issue_resolved = self.db.transaction(|tx| resolve_random_issue(tx, rng, now))?;
            if let Some(id) = report.issue_resolved {
                log::info!("[SIMULATOR] Auto-resolved issue #{}", id);
            }
        }

        if self.config.anomaly_every_ticks > 0 && self.tick % self.config.anomaly_every_ticks == 0 {
            let rng = &mut self.rng;
            let trigger = &mut self.trigger;
            report.anomaly_recorded = self
                .db
                .transaction(|tx| record_triggered_anomaly(tx, rng, trigger, now))?;
            if let Some(id) = report.anomaly_recorded {
                log::info!("[SIMULATOR] Recorded cost anomaly #{}", id);
            }
        }

        Ok(report)
    }
}

/// Random walk for every resource's snapshot, rescored with jitter. Returns resources touched.
fn perturb_fleet(
    conn: &Connection,
    rng: &mut StdRng,
    config: &SimulatorConfig,
    now: DateTime<Utc>,
) -> FleetResult<usize> {
    let resources = db::resources::list_all(conn)?;
    for resource in &resources {
        let snapshot = perturb(rng, &resource.snapshot(), config.connection_margin);
        let jitter = if config.health_jitter > 0.0 {
            rng.gen_range(-config.health_jitter..config.health_jitter)
        } else {
            0.0
        };
        let assessed = health::score_with_jitter(&snapshot, jitter);
        db::resources::update_snapshot(conn, resource.id, &snapshot, assessed.score, assessed.status, now)?;

        for (name, value, unit) in [
            ("cpu_usage", snapshot.cpu_usage, "%"),
            ("memory_usage", snapshot.memory_usage, "%"),
            ("storage_usage", snapshot.storage_usage, "%"),
            ("connections", snapshot.connections_active as f64, "count"),
        ] {
            db::metrics::insert(conn, resource.id, name, value, Some(unit), now)?;
        }
    }
    Ok(resources.len())
}

/// cpu drifts by up to 5 points, memory by up to 3, storage only grows, and connections move
/// by up to 10 within `[1, max - margin]`.
pub fn perturb<R: Rng>(rng: &mut R, current: &TelemetrySnapshot, connection_margin: i64) -> TelemetrySnapshot {
    let cpu = (current.cpu_usage + rng.gen_range(-5.0..5.0)).clamp(5.0, 99.0);
    let memory = (current.memory_usage + rng.gen_range(-3.0..3.0)).clamp(10.0, 99.0);
    // Storage only grows; values already above the cap are held, not pulled back.
    let storage_cap = 99.0_f64.max(current.storage_usage);
    let storage = (current.storage_usage + rng.gen_range(0.0..0.5)).clamp(10.0, storage_cap);
    let upper = (current.connections_max - connection_margin).max(1);
    let connections = (current.connections_active + rng.gen_range(-10..=10)).clamp(1, upper);
    TelemetrySnapshot {
        cpu_usage: health::round2(cpu),
        memory_usage: health::round2(memory),
        storage_usage: health::round2(storage).max(current.storage_usage),
        connections_active: connections,
        connections_max: current.connections_max,
    }
}

fn detect_random_issue(
    conn: &Connection,
    rng: &mut StdRng,
    now: DateTime<Utc>,
) -> FleetResult<Option<IssueDetection>> {
    let resources = db::resources::list_all(conn)?;
    let (Some(resource), Some(entry)) = (resources.choose(rng), ISSUE_TEMPLATES.choose(rng)) else {
        return Ok(None);
    };
    lifecycle::create_or_bump_in(conn, resource.id, &entry.to_template(), now).map(Some)
}

/// Only `Active` issues are candidates; acknowledged ones are left to their owner.
fn resolve_random_issue(conn: &Connection, rng: &mut StdRng, now: DateTime<Utc>) -> FleetResult<Option<i64>> {
    let active = db::issues::ids_with_status(conn, IssueStatus::Active)?;
    let Some(&id) = active.choose(rng) else {
        return Ok(None);
    };
    lifecycle::resolve_in(conn, id, AUTO_REMEDIATION_ACTOR, now)?;
    Ok(Some(id))
}

fn record_triggered_anomaly<T: AnomalyTrigger>(
    conn: &Connection,
    rng: &mut StdRng,
    trigger: &mut T,
    now: DateTime<Utc>,
) -> FleetResult<Option<i64>> {
    let resources = db::resources::list_all(conn)?;
    let Some(resource) = resources.choose(rng) else {
        return Ok(None);
    };
    let Some(signal) = trigger.evaluate(resource) else {
        return Ok(None);
    };
    let anomaly = cost::detect_anomaly_in(conn, resource.id, signal.amount, signal.anomaly_type, now)?;
    Ok(Some(anomaly.id))
}

/// Drive `simulator` until `token` is cancelled. Ticks run on the blocking pool.
pub async fn run_simulator<T>(mut simulator: Simulator<T>, token: CancellationToken, stats: Arc<SimulatorStats>)
where
    T: AnomalyTrigger + Send + 'static,
{
    log::info!(
        "[SIMULATOR] Started (interval: {}s)",
        simulator.interval().as_secs_f64()
    );

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("[SIMULATOR] Cancelled after {} ticks", simulator.ticks());
                break;
            }
            _ = tokio::time::sleep(simulator.interval()) => {}
        }

        let joined = tokio::task::spawn_blocking(move || {
            let result = simulator.run_tick();
            if log::log_enabled!(log::Level::Debug) {
                match lifecycle::counter_drift(&simulator.db) {
                    Ok(drift) if !drift.is_empty() => {
                        log::debug!("[SIMULATOR] Counter drift detected: {:?}", drift)
                    }
                    Ok(_) => {}
                    Err(e) => log::debug!("[SIMULATOR] Counter drift check failed: {}", e),
                }
            }
            (simulator, result)
        })
        .await;

        let result = match joined {
            Ok((returned, result)) => {
                simulator = returned;
                result
            }
            Err(e) => {
                log::error!("[SIMULATOR] Tick task failed, stopping: {}", e);
                return;
            }
        };

        match result {
            Ok(report) => {
                stats.ticks_completed.fetch_add(1, Ordering::Relaxed);
                *stats.last_tick_at.lock().await = Some(Utc::now().to_rfc3339());
                log::debug!(
                    "[SIMULATOR] Tick {} complete: {} resources updated",
                    report.tick,
                    report.resources_updated
                );
            }
            Err(e) => {
                log::error!("[SIMULATOR] Tick {} failed: {}", simulator.ticks(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{fixtures, get_resource, list_resources};
    use crate::seed;

    fn seeded_db(seed: u64) -> Arc<Db> {
        let db = Arc::new(Db::open(":memory:").unwrap());
        let mut rng = StdRng::seed_from_u64(seed);
        seed::seed_fleet(&db, &mut rng, 6).unwrap();
        db
    }

    fn config(seed: u64) -> SimulatorConfig {
        SimulatorConfig {
            interval: Duration::from_millis(10),
            seed: Some(seed),
            ..Default::default()
        }
    }

    /// Always fires with a fixed amount.
    struct FixedTrigger {
        amount: f64,
    }

    impl AnomalyTrigger for FixedTrigger {
        fn evaluate(&mut self, _resource: &Resource) -> Option<AnomalySignal> {
            Some(AnomalySignal {
                anomaly_type: CostAnomalyType::Spike,
                amount: self.amount,
            })
        }
    }

    fn quiet_config() -> SimulatorConfig {
        SimulatorConfig {
            issue_probability: 0.0,
            resolve_probability: 0.0,
            ..config(1)
        }
    }

    #[test]
    fn test_perturb_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut snap = TelemetrySnapshot {
            cpu_usage: 98.0,
            memory_usage: 11.0,
            storage_usage: 98.9,
            connections_active: 94,
            connections_max: 100,
        };
        for _ in 0..500 {
            let next = perturb(&mut rng, &snap, 5);
            assert!((5.0..=99.0).contains(&next.cpu_usage));
            assert!((10.0..=99.0).contains(&next.memory_usage));
            assert!(next.storage_usage >= snap.storage_usage);
            assert!((1..=95).contains(&next.connections_active));
            snap = next;
        }
    }

    #[test]
    fn test_perturb_holds_storage_above_cap() {
        let mut rng = StdRng::seed_from_u64(23);
        for start in [99.0, 99.5, 99.994, 100.0] {
            let snap = TelemetrySnapshot {
                cpu_usage: 50.0,
                memory_usage: 50.0,
                storage_usage: start,
                connections_active: 20,
                connections_max: 100,
            };
            for _ in 0..50 {
                let next = perturb(&mut rng, &snap, 5);
                assert!(next.storage_usage >= start);
                assert!(next.storage_usage <= 100.0);
            }
        }
    }

    #[test]
    fn test_perturb_small_connection_limit() {
        let mut rng = StdRng::seed_from_u64(5);
        let snap = TelemetrySnapshot {
            cpu_usage: 50.0,
            memory_usage: 50.0,
            storage_usage: 50.0,
            connections_active: 2,
            connections_max: 3,
        };
        for _ in 0..50 {
            assert_eq!(perturb(&mut rng, &snap, 5).connections_active, 1);
        }
    }

    #[test]
    fn test_seeded_ticks_are_replayable() {
        let run = |seed: u64| {
            let db = seeded_db(42);
            let mut sim = Simulator::new(db.clone(), config(seed));
            for _ in 0..20 {
                sim.run_tick().unwrap();
            }
            let resources = list_resources(&db, &ResourceFilter::default()).unwrap();
            let issues = lifecycle::list_issues(&db, &IssueFilter::default()).unwrap();
            (
                resources
                    .iter()
                    .map(|r| (r.cpu_usage, r.memory_usage, r.connections_active, r.health_score, r.active_issue_count))
                    .collect::<Vec<_>>(),
                issues
                    .iter()
                    .map(|i| (i.id, i.status, i.occurrence_count))
                    .collect::<Vec<_>>(),
            )
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn test_counter_invariant_holds_across_ticks() {
        let db = seeded_db(3);
        let mut sim = Simulator::new(
            db.clone(),
            SimulatorConfig {
                issue_probability: 0.9,
                resolve_probability: 0.6,
                ..config(77)
            },
        );
        let mut opened = 0;
        let mut resolved = 0;
        for _ in 0..60 {
            let report = sim.run_tick().unwrap();
            assert_eq!(report.resources_updated, 6);
            if report.issue_detected.is_some() {
                opened += 1;
            }
            if report.issue_resolved.is_some() {
                resolved += 1;
            }
            assert!(lifecycle::counter_drift(&db).unwrap().is_empty());
        }
        assert!(opened > 0);
        assert!(resolved > 0);

        let resolved_issues = lifecycle::list_issues(&db, &IssueFilter {
            status: Some(IssueStatus::Resolved),
            ..Default::default()
        })
        .unwrap();
        assert!(resolved_issues
            .iter()
            .all(|i| i.resolved_by.as_deref() == Some(AUTO_REMEDIATION_ACTOR)));
    }

    #[test]
    fn test_anomalies_follow_cadence() {
        let db = Arc::new(Db::open(":memory:").unwrap());
        fixtures::resource(&db, "orders-db");
        let mut sim = Simulator::with_trigger(
            db.clone(),
            quiet_config(),
            StdRng::seed_from_u64(1),
            FixedTrigger { amount: 25.0 },
        );

        let reports: Vec<TickReport> = (0..6).map(|_| sim.run_tick().unwrap()).collect();
        let recorded: Vec<u64> = reports
            .iter()
            .filter(|r| r.anomaly_recorded.is_some())
            .map(|r| r.tick)
            .collect();
        assert_eq!(recorded, vec![3, 6]);

        let anomalies = cost::list_anomalies(&db, &AnomalyFilter::default()).unwrap();
        assert_eq!(anomalies.len(), 2);
        // fixture monthly cost 300 -> baseline 10
        assert_eq!(anomalies[0].deviation_percent, 150.0);
    }

    #[test]
    fn test_failed_sub_step_rolls_back_and_keeps_counter() {
        let db = Arc::new(Db::open(":memory:").unwrap());
        let res = fixtures::resource(&db, "orders-db");
        let mut sim = Simulator::with_trigger(
            db.clone(),
            SimulatorConfig {
                anomaly_every_ticks: 1,
                ..quiet_config()
            },
            StdRng::seed_from_u64(1),
            FixedTrigger { amount: -1.0 },
        );

        assert!(sim.run_tick().is_err());
        assert!(cost::list_anomalies(&db, &AnomalyFilter::default()).unwrap().is_empty());
        assert!(lifecycle::counter_drift(&db).unwrap().is_empty());
        // the snapshot step committed before the failing anomaly step
        assert!(get_resource(&db, res.id).unwrap().last_seen_at >= res.last_seen_at);

        // the tick counter still advances so the next tick can run
        assert!(sim.run_tick().is_err());
        assert_eq!(sim.ticks(), 2);
    }

    #[test]
    fn test_random_trigger_amount_range() {
        let db = Db::open(":memory:").unwrap();
        let res = fixtures::resource(&db, "orders-db");
        let mut trigger = RandomDeviationTrigger::new(StdRng::seed_from_u64(4), 1.0, (20.0, 100.0));
        for _ in 0..100 {
            let signal = trigger.evaluate(&res).unwrap();
            assert!(signal.amount >= 12.0 && signal.amount <= 20.0);
        }
        let mut never = RandomDeviationTrigger::new(StdRng::seed_from_u64(4), 0.0, (20.0, 100.0));
        assert!(never.evaluate(&res).is_none());
    }

    #[tokio::test]
    async fn test_loop_ticks_until_cancelled() {
        let db = seeded_db(8);
        let stats = Arc::new(SimulatorStats::default());
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_simulator(
            Simulator::new(db.clone(), config(8)),
            token.clone(),
            stats.clone(),
        ));

        for _ in 0..200 {
            if stats.ticks_completed.load(Ordering::Relaxed) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("simulator stops after cancel")
            .unwrap();

        assert!(stats.ticks_completed.load(Ordering::Relaxed) >= 2);
        assert!(stats.last_tick_at.lock().await.is_some());
        assert!(lifecycle::counter_drift(&db).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_sleep_stops_promptly() {
        let db = Arc::new(Db::open(":memory:").unwrap());
        let stats = Arc::new(SimulatorStats::default());
        let token = CancellationToken::new();
        let sim = Simulator::new(
            db,
            SimulatorConfig {
                interval: Duration::from_secs(3600),
                ..config(1)
            },
        );
        let handle = tokio::spawn(run_simulator(sim, token.clone(), stats.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancel wakes the sleeping loop")
            .unwrap();
        assert_eq!(stats.ticks_completed.load(Ordering::Relaxed), 0);
    }
}
