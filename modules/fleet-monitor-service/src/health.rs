//! Health scoring: telemetry snapshot to a score in [0, 100] and its bucket.
//!
//! Pure functions only. Jitter is an input supplied by the simulator; [`score`] never jitters.

use fleet_monitor_types::{HealthStatus, TelemetrySnapshot};

const CPU_WEIGHT: f64 = 0.3;
const MEMORY_WEIGHT: f64 = 0.3;
const STORAGE_WEIGHT: f64 = 0.2;
const CONNECTION_WEIGHT: f64 = 0.2;

/// The weighted load is divided once more by this before being subtracted from 100.
/// Kept as-is for compatibility with existing dashboards; see DESIGN.md.
const LOAD_DIVISOR: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthScore {
    pub score: f64,
    pub status: HealthStatus,
}

/// Connection saturation as a percentage. A zero maximum contributes no load.
pub fn connection_load(active: i64, max: i64) -> f64 {
    if max <= 0 {
        return 0.0;
    }
    active as f64 / max as f64 * 100.0
}

pub fn weighted_load(snapshot: &TelemetrySnapshot) -> f64 {
    snapshot.cpu_usage * CPU_WEIGHT
        + snapshot.memory_usage * MEMORY_WEIGHT
        + snapshot.storage_usage * STORAGE_WEIGHT
        + connection_load(snapshot.connections_active, snapshot.connections_max) * CONNECTION_WEIGHT
}

pub fn score(snapshot: &TelemetrySnapshot) -> HealthScore {
    score_with_jitter(snapshot, 0.0)
}

/// Score with an additive jitter applied before clamping.
pub fn score_with_jitter(snapshot: &TelemetrySnapshot, jitter: f64) -> HealthScore {
    let raw = 100.0 - weighted_load(snapshot) / LOAD_DIVISOR + jitter;
    let score = round2(raw.clamp(0.0, 100.0));
    HealthScore {
        score,
        status: HealthStatus::from_score(score),
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(cpu: f64, mem: f64, storage: f64, active: i64, max: i64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cpu_usage: cpu,
            memory_usage: mem,
            storage_usage: storage,
            connections_active: active,
            connections_max: max,
        }
    }

    #[test]
    fn test_idle_resource_scores_full() {
        let result = score(&snap(0.0, 0.0, 0.0, 0, 100));
        assert_eq!(result.score, 100.0);
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_literal_formula() {
        // load = 15 + 12 + 10 + 10 = 47; 100 - 47/4 = 88.25
        let s = snap(50.0, 40.0, 50.0, 50, 100);
        assert!((weighted_load(&s) - 47.0).abs() < 1e-9);
        let result = score(&s);
        assert_eq!(result.score, 88.25);
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_saturated_resource_is_warning_without_jitter() {
        // load = 100, score = 75
        let result = score(&snap(100.0, 100.0, 100.0, 100, 100));
        assert_eq!(result.score, 75.0);
        assert_eq!(result.status, HealthStatus::Warning);
    }

    #[test]
    fn test_zero_max_connections_contributes_nothing() {
        assert_eq!(connection_load(10, 0), 0.0);
        let result = score(&snap(0.0, 0.0, 0.0, 10, 0));
        assert_eq!(result.score, 100.0);
        assert!(result.score.is_finite());
    }

    #[test]
    fn test_jitter_is_clamped() {
        let idle = snap(0.0, 0.0, 0.0, 0, 100);
        assert_eq!(score_with_jitter(&idle, 5.0).score, 100.0);
        assert_eq!(score_with_jitter(&idle, -5.0).score, 95.0);

        let busy = snap(100.0, 100.0, 100.0, 100, 100);
        assert_eq!(score_with_jitter(&busy, -80.0).score, 0.0);
        assert_eq!(score_with_jitter(&busy, -80.0).status, HealthStatus::Critical);
    }

    #[test]
    fn test_bucket_follows_rounded_score() {
        // 79.996 rounds to 80.0 before bucketing
        let result = score_with_jitter(&snap(0.0, 0.0, 0.0, 0, 100), -20.004);
        assert_eq!(result.score, 80.0);
        assert_eq!(result.status, HealthStatus::Healthy);
    }
}
