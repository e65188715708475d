//! 4-state constant-velocity Kalman filter over planar GPS positions.
//!
//! State: [x, y, vx, vy] in a local east/north frame (meters, m/s).
//! Observation: position only.
//!
//! Calls must come in `predict` → `update` pairs, one pair per observation.
//! [`GpsKalman::step`] does the pairing for the common case.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::geodesy::{from_local_xy, local_xy};
use crate::types::{KalmanGainPos, LatLon, ObservationPos, PosNoise2, PosVec2, StateMat4, StateVec4};

/// Snapshot of the filter mean.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterEstimate {
    pub x_m: f64,
    pub y_m: f64,
    pub vx_mps: f64,
    pub vy_mps: f64,
}

impl FilterEstimate {
    pub fn speed_mps(&self) -> f64 {
        self.vx_mps.hypot(self.vy_mps)
    }

    /// Course over ground in degrees clockwise from north.
    pub fn course_deg(&self) -> f64 {
        self.vx_mps.atan2(self.vy_mps).to_degrees()
    }
}

/// How an observation was absorbed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Correction {
    /// Regular Kalman correction
    Fused,
    /// Innovation covariance was singular or the result non-finite; the raw
    /// observation was taken as the position
    RawFallback,
}

pub struct GpsKalman {
    dt: f64,
    state: StateVec4,
    covariance: StateMat4,
    transition: StateMat4,
    process_noise: StateMat4,
    observation: ObservationPos,
    measurement_noise: PosNoise2,
    initial_covariance: f64,
    predicted: bool,
    update_count: u64,
    fallback_count: u64,
}

impl GpsKalman {
    pub fn new(config: &FilterConfig, dt: f64) -> Self {
        let q_pos = config.position_process_noise;
        let q_vel = config.velocity_process_noise;
        let r = config.measurement_noise;

        Self {
            dt,
            state: StateVec4::zeros(),
            covariance: StateMat4::identity() * config.initial_covariance,
            transition: Self::build_transition(dt),
            process_noise: StateMat4::from_diagonal(&StateVec4::new(q_pos, q_pos, q_vel, q_vel)),
            observation: ObservationPos::new(
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0,
            ),
            measurement_noise: PosNoise2::from_diagonal(&PosVec2::new(r, r)),
            initial_covariance: config.initial_covariance,
            predicted: false,
            update_count: 0,
            fallback_count: 0,
        }
    }

    fn build_transition(dt: f64) -> StateMat4 {
        let mut f = StateMat4::identity();
        f[(0, 2)] = dt;
        f[(1, 3)] = dt;
        f
    }

    /// Reset to a position with zero velocity and high uncertainty.
    pub fn initialize(&mut self, x0: f64, y0: f64) {
        self.state = StateVec4::new(x0, y0, 0.0, 0.0);
        self.covariance = StateMat4::identity() * self.initial_covariance;
        self.predicted = false;
    }

    pub fn set_timestep(&mut self, dt: f64) {
        self.dt = dt;
        self.transition = Self::build_transition(dt);
    }

    pub fn timestep(&self) -> f64 {
        self.dt
    }

    pub fn predict(&mut self) {
        self.state = self.transition * self.state;
        self.covariance =
            self.transition * self.covariance * self.transition.transpose() + self.process_noise;
        self.predicted = true;
    }

    pub fn update(&mut self, x: f64, y: f64) -> Correction {
        if !self.predicted {
            warn!("Kalman update without a preceding predict; covariance may be inconsistent");
        }
        self.predicted = false;

        let z = PosVec2::new(x, y);
        let h = &self.observation;
        let innovation = z - h * self.state;
        let s = h * self.covariance * h.transpose() + self.measurement_noise;

        let Some(s_inv) = s.try_inverse().filter(|m| m.iter().all(|v| v.is_finite())) else {
            return self.take_raw(x, y);
        };

        let gain: KalmanGainPos = self.covariance * h.transpose() * s_inv;
        let state = self.state + gain * innovation;

        // Joseph form keeps the covariance symmetric positive semi-definite
        let i_kh = StateMat4::identity() - gain * h;
        let covariance = i_kh * self.covariance * i_kh.transpose()
            + gain * self.measurement_noise * gain.transpose();

        if !state.iter().chain(covariance.iter()).all(|v| v.is_finite()) {
            return self.take_raw(x, y);
        }

        self.state = state;
        self.covariance = covariance;
        self.update_count += 1;
        Correction::Fused
    }

    fn take_raw(&mut self, x: f64, y: f64) -> Correction {
        warn!("Singular innovation covariance; using raw observation ({x:.2}, {y:.2})");
        self.state[0] = x;
        self.state[1] = y;
        if !self.state.iter().all(|v| v.is_finite()) {
            self.state[2] = 0.0;
            self.state[3] = 0.0;
        }
        if !self.covariance.iter().all(|v| v.is_finite()) {
            self.covariance = StateMat4::identity() * self.initial_covariance;
        }
        self.fallback_count += 1;
        Correction::RawFallback
    }

    /// `set_timestep` + `predict` + `update` for one observation.
    pub fn step(&mut self, dt: f64, x: f64, y: f64) -> Correction {
        self.set_timestep(dt);
        self.predict();
        self.update(x, y)
    }

    pub fn estimate(&self) -> FilterEstimate {
        FilterEstimate {
            x_m: self.state[0],
            y_m: self.state[1],
            vx_mps: self.state[2],
            vy_mps: self.state[3],
        }
    }

    /// RMS of the position variances (m).
    pub fn position_uncertainty(&self) -> f64 {
        ((self.covariance[(0, 0)] + self.covariance[(1, 1)]) / 2.0).sqrt()
    }

    pub fn covariance(&self) -> &StateMat4 {
        &self.covariance
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn fallback_count(&self) -> u64 {
        self.fallback_count
    }
}

/// Filter a planar trace. `dts[i]` is the step leading into observation `i`.
pub fn smooth_trace(
    config: &FilterConfig,
    observations: &[(f64, f64)],
    dts: &[f64],
) -> Vec<FilterEstimate> {
    let Some(&(x0, y0)) = observations.first() else {
        return Vec::new();
    };

    let mut kf = GpsKalman::new(config, dts.first().copied().unwrap_or(0.1));
    kf.initialize(x0, y0);

    observations
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| {
            let dt = dts.get(i).copied().unwrap_or_else(|| kf.timestep());
            kf.step(dt, x, y);
            kf.estimate()
        })
        .collect()
}

/// Denoise lat/lon samples spaced `dt` seconds apart.
///
/// Runs in the east/north plane of the first sample and maps back through the
/// exact inverse transform.
pub fn smooth_coordinates(config: &FilterConfig, points: &[LatLon], dt: f64) -> Vec<LatLon> {
    let Some(&anchor) = points.first() else {
        return Vec::new();
    };
    let observations: Vec<(f64, f64)> = points.iter().map(|p| local_xy(*p, anchor)).collect();
    let dts = vec![dt; points.len()];

    smooth_trace(config, &observations, &dts)
        .iter()
        .map(|est| from_local_xy(est.x_m, est.y_m, anchor))
        .collect()
}
