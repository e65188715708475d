//! "Current run" document: schema and frame assembly.

use chrono::{SecondsFormat, Utc};
use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::error::{Result, TrajectoryError};
use crate::filters::kalman::GpsKalman;
use crate::imu::ImuSample;
use crate::planner::eta_minutes;
use crate::route::SegmentMetrics;
use crate::simulator::VehicleState;
use crate::types::{Enu, LatLonAlt};

/// Below this fused speed the pose yaw follows the simulated heading (m/s).
const MIN_COURSE_SPEED_MPS: f64 = 0.5;

/// Filter step used for the first frame (s).
const FIRST_FRAME_DT_S: f64 = 0.1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub source: String,
    pub dt: f64,
    pub units: String,
    pub distance_km: f64,
    pub eta_min_optimum: f64,
    pub eta_min_vehicle: f64,
    pub created_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    /// `[lat, lon, alt_m]` per point
    pub polyline: Vec<[f64; 3]>,
    /// Legal cap per point (m/s)
    pub speed_limits: Vec<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EkfPose {
    pub x_m: f64,
    pub y_m: f64,
    pub vx_mps: f64,
    pub vy_mps: f64,
    pub yaw_deg: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub t: f64,
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
    pub enu_m: Enu,
    pub heading_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub vehicle_speed_mps: f64,
    pub optimum_speed_mps: f64,
    pub accel_body_mps2: [f64; 3],
    pub gyro_body_rps: [f64; 3],
    pub ekf: EkfPose,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentRun {
    pub meta: Meta,
    pub route: RouteSummary,
    pub frames: Vec<Frame>,
}

/// Per-point signals of one run, index-aligned.
pub struct RunSignals<'a> {
    pub source: &'a str,
    pub dt: f64,
    pub positions: &'a [LatLonAlt],
    pub enu: &'a [Vector3<f64>],
    pub metrics: &'a [SegmentMetrics],
    pub legal_caps_mps: &'a [f64],
    pub optimum_mps: &'a [f64],
    pub states: &'a [VehicleState],
    pub imu: &'a [ImuSample],
    pub distance_m: f64,
    pub eta_min_optimum: f64,
}

pub struct RunAssembler {
    filter: FilterConfig,
}

impl RunAssembler {
    pub fn new(filter: FilterConfig) -> Self {
        Self { filter }
    }

    pub fn assemble(&self, signals: &RunSignals) -> Result<CurrentRun> {
        if !signals.dt.is_finite() || signals.dt <= 0.0 {
            return Err(TrajectoryError::InvalidTimestep(signals.dt));
        }
        let n = signals.positions.len();
        let lengths = [
            signals.enu.len(),
            signals.metrics.len(),
            signals.legal_caps_mps.len(),
            signals.optimum_mps.len(),
            signals.states.len(),
            signals.imu.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            return Err(TrajectoryError::Engine(format!(
                "signal lengths {lengths:?} do not match {n} route points"
            )));
        }

        let poses = self.ekf_poses(signals.enu, signals.states, signals.metrics);
        let frames: Vec<Frame> = (0..n)
            .map(|i| {
                let p = signals.positions[i];
                let state = &signals.states[i];
                let imu = &signals.imu[i];
                Frame {
                    t: i as f64 * signals.dt,
                    lat: p.lat,
                    lon: p.lon,
                    alt_m: p.alt,
                    enu_m: Enu::from(signals.enu[i]),
                    heading_deg: state.heading_deg,
                    pitch_deg: imu.pitch_deg,
                    roll_deg: imu.roll_deg,
                    vehicle_speed_mps: state.speed_mps,
                    optimum_speed_mps: signals.optimum_mps[i],
                    accel_body_mps2: imu.accel_body_mps2.into(),
                    gyro_body_rps: imu.gyro_body_rps.into(),
                    ekf: poses[i],
                }
            })
            .collect();

        let realized: Vec<f64> = signals.states.iter().map(|s| s.speed_mps).collect();
        let meta = Meta {
            source: signals.source.to_string(),
            dt: signals.dt,
            units: "SI".to_string(),
            distance_km: signals.distance_m / 1000.0,
            eta_min_optimum: signals.eta_min_optimum,
            eta_min_vehicle: eta_minutes(&realized, signals.metrics),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        Ok(CurrentRun {
            meta,
            route: RouteSummary {
                polyline: signals.positions.iter().map(|p| [p.lat, p.lon, p.alt]).collect(),
                speed_limits: signals.legal_caps_mps.to_vec(),
            },
            frames,
        })
    }

    /// Run the 4-state filter over the ENU trace with a step derived from
    /// realized travel time rather than the frame clock.
    pub fn ekf_poses(&self, enu: &[Vector3<f64>], states: &[VehicleState], metrics: &[SegmentMetrics]) -> Vec<EkfPose> {
        let Some(first) = enu.first() else {
            return Vec::new();
        };
        let mut kf = GpsKalman::new(&self.filter, FIRST_FRAME_DT_S);
        kf.initialize(first.x, first.y);

        let poses: Vec<EkfPose> = enu
            .iter()
            .zip(states)
            .enumerate()
            .map(|(i, (p, state))| {
                let dt = if i == 0 {
                    FIRST_FRAME_DT_S
                } else {
                    self.travel_dt(metrics.get(i).map_or(0.0, |m| m.distance_m), states[i - 1].speed_mps, state.speed_mps)
                };
                kf.step(dt, p.x, p.y);
                let est = kf.estimate();
                let yaw_deg = if est.speed_mps() > MIN_COURSE_SPEED_MPS {
                    est.course_deg()
                } else {
                    state.heading_deg
                };
                EkfPose {
                    x_m: est.x_m,
                    y_m: est.y_m,
                    vx_mps: est.vx_mps,
                    vy_mps: est.vy_mps,
                    yaw_deg,
                }
            })
            .collect();

        if kf.fallback_count() > 0 {
            debug!("EKF took {} raw fallbacks over {} frames", kf.fallback_count(), poses.len());
        }
        poses
    }

    fn travel_dt(&self, distance_m: f64, v_prev: f64, v: f64) -> f64 {
        let avg = ((v_prev + v) / 2.0).max(0.1);
        (distance_m / avg).clamp(self.filter.min_dt_s, self.filter.max_dt_s)
    }
}
