//! Forward vehicle integrator over a planned speed profile.
//!
//! One frame per route point, `dt` seconds apart. Each frame depends only on
//! the previous frame, the current target speed and the ENU displacement.

use nalgebra::Vector3;

use crate::config::VehicleLimits;
use crate::error::{Result, TrajectoryError};
use crate::types::Enu;

pub const GRAVITY_MPS2: f64 = 9.81;

/// Displacements shorter than this keep the previous heading (m).
const MIN_HEADING_DISPLACEMENT_M: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleState {
    pub speed_mps: f64,
    /// Body frame (forward, right, up), matching the clockwise heading; lateral
    /// is filled in by the IMU stage and is positive in a right turn
    pub accel_body_mps2: Vector3<f64>,
    /// Degrees clockwise from north
    pub heading_deg: f64,
    pub enu: Enu,
}

pub struct VehicleSimulator {
    accel_mps2: f64,
    brake_mps2: f64,
    initial_speed_mps: f64,
    dt: f64,
}

impl VehicleSimulator {
    pub fn new(limits: &VehicleLimits, dt: f64) -> Result<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(TrajectoryError::InvalidTimestep(dt));
        }
        Ok(Self {
            accel_mps2: limits.accel_mps2,
            brake_mps2: limits.brake_mps2,
            initial_speed_mps: limits.initial_speed_mps,
            dt,
        })
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// First frame: initial speed, heading of the first segment if any.
    pub fn initial_state(&self, enu: &[Vector3<f64>]) -> VehicleState {
        let heading_deg = match enu {
            [a, b, ..] => heading_between(a, b).unwrap_or(0.0),
            _ => 0.0,
        };
        VehicleState {
            speed_mps: self.initial_speed_mps,
            accel_body_mps2: Vector3::new(0.0, 0.0, GRAVITY_MPS2),
            heading_deg,
            enu: enu.first().copied().map(Enu::from).unwrap_or_default(),
        }
    }

    /// Advance one frame toward `target_mps`, ending at `position`.
    pub fn step(&self, prev: &VehicleState, target_mps: f64, position: Vector3<f64>) -> VehicleState {
        let v_prev = prev.speed_mps;
        let speed_mps = if target_mps > v_prev {
            target_mps.min(v_prev + self.accel_mps2 * self.dt)
        } else {
            target_mps.max(v_prev - self.brake_mps2 * self.dt)
        }
        .max(0.0);

        let from = Vector3::new(prev.enu.x, prev.enu.y, prev.enu.z);
        let heading_deg = heading_between(&from, &position).unwrap_or(prev.heading_deg);

        VehicleState {
            speed_mps,
            accel_body_mps2: Vector3::new((speed_mps - v_prev) / self.dt, 0.0, GRAVITY_MPS2),
            heading_deg,
            enu: Enu::from(position),
        }
    }

    /// Run over the whole profile. `enu` and `profile` must be index-aligned.
    pub fn run(&self, enu: &[Vector3<f64>], profile: &[f64]) -> Vec<VehicleState> {
        let n = enu.len().min(profile.len());
        let mut states = Vec::with_capacity(n);
        if n == 0 {
            return states;
        }

        let mut state = self.initial_state(enu);
        states.push(state);
        for i in 1..n {
            state = self.step(&state, profile[i], enu[i]);
            states.push(state);
        }
        states
    }
}

/// `atan2(Δeast, Δnorth)` in degrees; `None` for a negligible displacement.
pub fn heading_between(a: &Vector3<f64>, b: &Vector3<f64>) -> Option<f64> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    if dx.hypot(dy) < MIN_HEADING_DISPLACEMENT_M {
        return None;
    }
    Some(dx.atan2(dy).to_degrees())
}

/// Heading per point of an ENU polyline, holding the last heading over
/// repeated points and seeding point 0 from the first segment.
pub fn heading_series(enu: &[Vector3<f64>]) -> Vec<f64> {
    let mut headings = Vec::with_capacity(enu.len());
    let mut current = match enu {
        [a, b, ..] => heading_between(a, b).unwrap_or(0.0),
        _ => 0.0,
    };
    for (i, p) in enu.iter().enumerate() {
        if i > 0 {
            current = heading_between(&enu[i - 1], p).unwrap_or(current);
        }
        headings.push(current);
    }
    headings
}
