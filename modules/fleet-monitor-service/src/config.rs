//! Service settings read from the environment (optionally via `.env`).

use crate::simulator::SimulatorConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub port: u16,
    pub db_path: String,
    pub seed_on_start: bool,
    pub simulator_enabled: bool,
    pub tick_interval_secs: u64,
    pub simulator_seed: Option<u64>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            port: 9110,
            db_path: "./fleet_monitor.db".to_string(),
            seed_on_start: true,
            simulator_enabled: true,
            tick_interval_secs: 5,
            simulator_seed: None,
        }
    }
}

impl FleetConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparseable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let flag = |key: &str, default: bool| lookup(key).and_then(|s| parse_flag(&s)).unwrap_or(default);

        Self {
            port: lookup("FLEET_MONITOR_PORT")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.port),
            db_path: lookup("FLEET_MONITOR_DB_PATH")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.db_path),
            seed_on_start: flag("FLEET_MONITOR_SEED_ON_START", defaults.seed_on_start),
            simulator_enabled: flag("FLEET_MONITOR_SIMULATOR", defaults.simulator_enabled),
            tick_interval_secs: parsed("FLEET_MONITOR_SIM_INTERVAL")
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.tick_interval_secs),
            simulator_seed: parsed("FLEET_MONITOR_SIM_SEED"),
        }
    }

    pub fn simulator(&self) -> SimulatorConfig {
        SimulatorConfig {
            interval: Duration::from_secs(self.tick_interval_secs),
            seed: self.simulator_seed,
            ..Default::default()
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> FleetConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FleetConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.port, 9110);
        assert_eq!(config.db_path, "./fleet_monitor.db");
        assert!(config.seed_on_start);
        assert!(config.simulator_enabled);
        assert_eq!(config.tick_interval_secs, 5);
        assert_eq!(config.simulator_seed, None);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("FLEET_MONITOR_PORT", "9200"),
            ("FLEET_MONITOR_DB_PATH", ":memory:"),
            ("FLEET_MONITOR_SEED_ON_START", "false"),
            ("FLEET_MONITOR_SIMULATOR", "off"),
            ("FLEET_MONITOR_SIM_INTERVAL", "2"),
            ("FLEET_MONITOR_SIM_SEED", "42"),
        ]);
        assert_eq!(config.port, 9200);
        assert_eq!(config.db_path, ":memory:");
        assert!(!config.seed_on_start);
        assert!(!config.simulator_enabled);
        assert_eq!(config.simulator().interval, Duration::from_secs(2));
        assert_eq!(config.simulator().seed, Some(42));
    }

    #[test]
    fn test_garbage_falls_back() {
        let config = config_from(&[
            ("FLEET_MONITOR_PORT", "not-a-port"),
            ("FLEET_MONITOR_SIMULATOR", "maybe"),
            ("FLEET_MONITOR_SIM_INTERVAL", "0"),
            ("FLEET_MONITOR_SIM_SEED", "-3"),
        ]);
        assert_eq!(config.port, 9110);
        assert!(config.simulator_enabled);
        assert_eq!(config.tick_interval_secs, 5);
        assert_eq!(config.simulator_seed, None);
    }
}
