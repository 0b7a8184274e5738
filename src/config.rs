//! Runtime configuration, loaded from an optional JSON file.
//!
//! Every field has a default, so a file only needs the values it changes:
//!
//! ```json
//! { "scan": { "progress_timeout_ms": 5000 }, "sim": { "repeat_readings": true } }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub sim: SimConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Track discovery parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Cruising speed while scanning, mm/s
    pub scan_speed: u16,
    /// Acceleration up to the cruising speed, mm/s²
    pub scan_accel: u16,
    /// Deceleration used for the stop at the pre-finish line, mm/s²
    pub stop_accel: u16,
    /// Longest wait for a new position marker before giving up
    pub progress_timeout_ms: u64,
    /// Start/finish crossings after which the scan stops regardless
    pub max_start_finish_crossings: u32,
    /// Telemetry queue depth between the session and the scan
    pub event_queue_capacity: usize,
}

impl ScanConfig {
    pub fn progress_timeout(&self) -> Duration {
        Duration::from_millis(self.progress_timeout_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_speed: 700,
            scan_accel: 700,
            stop_accel: 2800,
            progress_timeout_ms: 10_000,
            max_start_finish_crossings: 3,
            event_queue_capacity: 64,
        }
    }
}

/// Simulated vehicle behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Time between two position updates while driving
    pub tick_ms: u64,
    /// Send every reading twice, like a vehicle re-reporting a marker
    pub repeat_readings: bool,
    /// Index of the layout piece the vehicle is placed on
    pub start_piece: usize,
    pub firmware_version: u16,
    pub battery_level: u16,
}

impl SimConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_ms: 40,
            repeat_readings: false,
            start_piece: 1,
            firmware_version: 0x2e68,
            battery_level: 3900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "scan": { "progress_timeout_ms": 250 } }"#).unwrap();
        assert_eq!(config.scan.progress_timeout(), Duration::from_millis(250));
        assert_eq!(config.scan.scan_speed, 700);
        assert_eq!(config.scan.stop_accel, 2800);
        assert_eq!(config.sim, SimConfig::default());
    }

    #[test]
    fn test_load_reports_bad_json() {
        let name = format!("trackrunner-config-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        fs::write(&path, "{ not json").unwrap();
        let result = Config::load(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(crate::error::Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/definitely/not/here/trackrunner.json");
        assert!(matches!(result, Err(crate::error::Error::Io(_))));
    }
}
