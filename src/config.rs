//! Explicit configuration for every pipeline stage.
//!
//! Components receive these structs at construction; nothing below the
//! binaries reads the process environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};

/// Dynamic limits of the simulated vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleLimits {
    /// Comfortable acceleration (m/s²)
    pub accel_mps2: f64,
    /// Comfortable braking, positive (m/s²)
    pub brake_mps2: f64,
    /// Lateral comfort bound used for the curvature cap (m/s²)
    pub lateral_accel_mps2: f64,
    pub max_speed_kmh: f64,
    /// Floor of every planned speed so time integration never divides by zero
    pub min_crawl_kmh: f64,
    /// Realized speed at the first frame
    pub initial_speed_mps: f64,
}

impl Default for VehicleLimits {
    fn default() -> Self {
        Self {
            accel_mps2: 1.8,
            brake_mps2: 3.5,
            lateral_accel_mps2: 1.5,
            max_speed_kmh: 120.0,
            min_crawl_kmh: 2.0,
            initial_speed_mps: 0.0,
        }
    }
}

impl VehicleLimits {
    pub fn max_speed_mps(&self) -> f64 {
        self.max_speed_kmh / 3.6
    }

    pub fn min_crawl_mps(&self) -> f64 {
        self.min_crawl_kmh / 3.6
    }
}

/// Speed planner heuristics and pass parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Band posted limits are clamped into (km/h)
    pub legal_min_kmh: f64,
    pub legal_max_kmh: f64,
    /// Lower clamp of the attribute-derived target (km/h)
    pub heuristic_floor_kmh: f64,
    /// Route-end window without anticipatory braking (m)
    pub final_corridor_m: f64,
    /// Fixed weather/traffic multiplier
    pub weather_factor: f64,
    /// Curvature below this is treated as straight (1/m)
    pub curvature_epsilon: f64,
    /// Floor on segment length in the pass time estimate (m)
    pub min_segment_m: f64,
    /// Floor on the per-segment time estimate (s)
    pub min_segment_time_s: f64,
    /// Floor on the reference speed dividing segment length (m/s)
    pub min_reference_speed_mps: f64,
    /// Feed fixed-gain smoothed coordinates to the turn/segment heuristics
    pub advisory_smoothing: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            legal_min_kmh: 20.0,
            legal_max_kmh: 140.0,
            heuristic_floor_kmh: 15.0,
            final_corridor_m: 300.0,
            weather_factor: 1.0,
            curvature_epsilon: 1e-9,
            min_segment_m: 1.0,
            min_segment_time_s: 0.3,
            min_reference_speed_mps: 0.5,
            advisory_smoothing: true,
        }
    }
}

/// Noise model of the GPS fusion filter and the advisory smoother.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub position_process_noise: f64,
    pub velocity_process_noise: f64,
    /// Measurement variance, same on both axes (m²)
    pub measurement_noise: f64,
    /// Diagonal of the initial covariance
    pub initial_covariance: f64,
    /// Clamp of the travel-time-derived filter step (s)
    pub min_dt_s: f64,
    pub max_dt_s: f64,
    /// Fixed gain of the lat/lon advisory smoother
    pub advisory_gain: f64,
    /// Nominal raw GPS accuracy reported by the advisory smoother (m)
    pub advisory_accuracy_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            position_process_noise: 1e-3,
            velocity_process_noise: 5e-2,
            measurement_noise: 3.0,
            initial_covariance: 10.0,
            min_dt_s: 0.05,
            max_dt_s: 2.0,
            advisory_gain: 0.3,
            advisory_accuracy_m: 3.0,
        }
    }
}

/// Optional out-of-process physics engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub path: Option<PathBuf>,
    pub timeout_secs: u64,
    pub enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            timeout_secs: 30,
            enabled: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub vehicle: VehicleLimits,
    pub planner: PlannerConfig,
    pub filter: FilterConfig,
    pub engine: EngineConfig,
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let v = &self.vehicle;
        let p = &self.planner;
        let f = &self.filter;

        positive("vehicle.accel_mps2", v.accel_mps2)?;
        positive("vehicle.brake_mps2", v.brake_mps2)?;
        positive("vehicle.lateral_accel_mps2", v.lateral_accel_mps2)?;
        positive("vehicle.max_speed_kmh", v.max_speed_kmh)?;
        positive("vehicle.min_crawl_kmh", v.min_crawl_kmh)?;
        if v.min_crawl_kmh >= v.max_speed_kmh {
            return Err(invalid("vehicle.min_crawl_kmh must be below max_speed_kmh"));
        }
        if !v.initial_speed_mps.is_finite() || v.initial_speed_mps < 0.0 {
            return Err(invalid("vehicle.initial_speed_mps must be >= 0"));
        }

        positive("planner.legal_min_kmh", p.legal_min_kmh)?;
        if p.legal_max_kmh < p.legal_min_kmh {
            return Err(invalid("planner.legal_max_kmh below legal_min_kmh"));
        }
        positive("planner.heuristic_floor_kmh", p.heuristic_floor_kmh)?;
        positive("planner.weather_factor", p.weather_factor)?;
        positive("planner.min_segment_m", p.min_segment_m)?;
        positive("planner.min_segment_time_s", p.min_segment_time_s)?;
        positive("planner.min_reference_speed_mps", p.min_reference_speed_mps)?;
        if !p.final_corridor_m.is_finite() || p.final_corridor_m < 0.0 {
            return Err(invalid("planner.final_corridor_m must be >= 0"));
        }
        if !p.curvature_epsilon.is_finite() || p.curvature_epsilon < 0.0 {
            return Err(invalid("planner.curvature_epsilon must be >= 0"));
        }

        positive("filter.position_process_noise", f.position_process_noise)?;
        positive("filter.velocity_process_noise", f.velocity_process_noise)?;
        positive("filter.measurement_noise", f.measurement_noise)?;
        positive("filter.initial_covariance", f.initial_covariance)?;
        positive("filter.min_dt_s", f.min_dt_s)?;
        if f.max_dt_s < f.min_dt_s {
            return Err(invalid("filter.max_dt_s below min_dt_s"));
        }
        if !(f.advisory_gain > 0.0 && f.advisory_gain <= 1.0) {
            return Err(invalid("filter.advisory_gain must be in (0, 1]"));
        }
        positive("filter.advisory_accuracy_m", f.advisory_accuracy_m)?;

        if self.engine.timeout_secs == 0 {
            return Err(invalid("engine.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> TrajectoryError {
    TrajectoryError::InvalidConfig(msg.to_string())
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TrajectoryError::InvalidConfig(format!(
            "{name} must be finite and > 0 (got {value})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{"vehicle": {"accel_mps2": 2.5}, "engine": {"enabled": false}}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.vehicle.accel_mps2, 2.5);
        assert_eq!(config.vehicle.brake_mps2, 3.5);
        assert!(!config.engine.enabled);
        assert_eq!(config.planner.final_corridor_m, 300.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.vehicle.brake_mps2 = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.planner.legal_max_kmh = 10.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.filter.advisory_gain = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unit_conversions() {
        let limits = VehicleLimits::default();
        assert!((limits.max_speed_mps() - 33.333).abs() < 1e-3);
        assert!((limits.min_crawl_mps() - 0.5556).abs() < 1e-3);
    }
}
