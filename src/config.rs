//! Tunable constants for the speed estimation and timer pipeline.
//!
//! Every threshold the engine compares against lives here so a deployment can
//! override them from a JSON file. Missing keys fall back to the defaults.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpeedoError};
use crate::timers::{
    default_distance_milestones, default_speed_milestones, DistanceMilestone, SpeedMilestone,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // GPS lock
    pub max_horizontal_accuracy_m: f64,
    pub min_satellites: u32,

    // Speed estimation
    pub moving_speed_kmh: f64,
    pub jitter_distance_km: f64,
    pub jitter_interval_secs: f64,
    pub max_plausible_speed_kmh: f64,

    // Incline
    pub incline_threshold_deg: f64,
    pub max_altitude_accuracy_m: f64,
    pub altitude_window: usize,
    pub incline_min_baseline_km: f64,

    // Interpolation
    pub tick_interval_ms: u64,
    pub expected_fix_interval_secs: f64,

    // Collaborator throttling and session persistence gates
    pub speed_log_interval_secs: f64,
    pub min_session_vmax_kmh: f64,
    pub min_session_distance_km: f64,

    pub speed_milestones: Vec<SpeedMilestone>,
    pub distance_milestones: Vec<DistanceMilestone>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_horizontal_accuracy_m: 20.0,
            min_satellites: 4,
            moving_speed_kmh: 1.0,
            jitter_distance_km: 0.001,
            jitter_interval_secs: 0.5,
            max_plausible_speed_kmh: 500.0,
            incline_threshold_deg: 2.0,
            max_altitude_accuracy_m: 50.0,
            altitude_window: 5,
            incline_min_baseline_km: 0.01,
            tick_interval_ms: 100,
            expected_fix_interval_secs: 1.0,
            speed_log_interval_secs: 10.0,
            min_session_vmax_kmh: 5.0,
            min_session_distance_km: 0.1,
            speed_milestones: default_speed_milestones(),
            distance_milestones: default_distance_milestones(),
        }
    }
}

impl EngineConfig {
    /// Load overrides from a JSON file and validate them
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_horizontal_accuracy_m", self.max_horizontal_accuracy_m),
            ("moving_speed_kmh", self.moving_speed_kmh),
            ("jitter_distance_km", self.jitter_distance_km),
            ("jitter_interval_secs", self.jitter_interval_secs),
            ("max_plausible_speed_kmh", self.max_plausible_speed_kmh),
            ("incline_threshold_deg", self.incline_threshold_deg),
            ("max_altitude_accuracy_m", self.max_altitude_accuracy_m),
            ("incline_min_baseline_km", self.incline_min_baseline_km),
            ("expected_fix_interval_secs", self.expected_fix_interval_secs),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SpeedoError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        let non_negative = [
            ("speed_log_interval_secs", self.speed_log_interval_secs),
            ("min_session_vmax_kmh", self.min_session_vmax_kmh),
            ("min_session_distance_km", self.min_session_distance_km),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SpeedoError::InvalidConfig(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }

        if self.altitude_window == 0 {
            return Err(SpeedoError::InvalidConfig(
                "altitude_window must hold at least one sample".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(SpeedoError::InvalidConfig(
                "tick_interval_ms must be non-zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let names = self
            .speed_milestones
            .iter()
            .map(|m| (m.name.as_str(), m.target_kmh))
            .chain(
                self.distance_milestones
                    .iter()
                    .map(|m| (m.name.as_str(), m.distance_km)),
            );
        for (name, target) in names {
            if !seen.insert(name) {
                return Err(SpeedoError::InvalidConfig(format!(
                    "duplicate milestone name '{name}'"
                )));
            }
            if !target.is_finite() || target <= 0.0 {
                return Err(SpeedoError::InvalidConfig(format!(
                    "milestone '{name}' needs a positive target, got {target}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.altitude_window, 5);
        assert_eq!(config.speed_milestones.len(), 14);
        assert_eq!(config.distance_milestones.len(), 4);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"incline_threshold_deg": 3.5, "min_satellites": 6}}"#).unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.incline_threshold_deg, 3.5);
        assert_eq!(config.min_satellites, 6);
        assert_eq!(config.max_plausible_speed_kmh, 500.0);
    }

    #[test]
    fn test_rejects_zero_window() {
        let config = EngineConfig {
            altitude_window: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SpeedoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_negative_threshold() {
        let config = EngineConfig {
            jitter_interval_secs: -0.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_milestones() {
        let mut config = EngineConfig::default();
        config.distance_milestones.push(DistanceMilestone::new("0-60", 1.0));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"altitude_window": 0}}"#).unwrap();
        assert!(EngineConfig::from_json_file(file.path()).is_err());
    }
}
