//! Synthetic inertial readings derived from the simulated heading trace.

use nalgebra::Vector3;

use crate::error::{Result, TrajectoryError};
use crate::geodesy::wrap_angle;
use crate::route::SegmentMetrics;
use crate::simulator::{VehicleState, GRAVITY_MPS2};

/// Roll is bounded to this many radians either side.
const MAX_ROLL_RAD: f64 = 0.25;

/// One frame of synthesized IMU output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImuSample {
    /// Body rates; only yaw (z) is modelled, clockwise-positive like the heading
    pub gyro_body_rps: Vector3<f64>,
    /// Simulator acceleration with the lateral component filled in
    pub accel_body_mps2: Vector3<f64>,
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

/// Yaw rate per frame (rad/s). The heading delta is wrapped before dividing,
/// so crossing ±180° never produces a spike. Frame 0 is zero.
pub fn yaw_rates(heading_deg: &[f64], dt: f64) -> Result<Vec<f64>> {
    if !dt.is_finite() || dt <= 0.0 {
        return Err(TrajectoryError::InvalidTimestep(dt));
    }
    let mut rates = vec![0.0; heading_deg.len()];
    for i in 1..heading_deg.len() {
        let delta = (heading_deg[i] - heading_deg[i - 1]).to_radians();
        rates[i] = wrap_angle(delta) / dt;
    }
    Ok(rates)
}

/// Centripetal acceleration `v · ω`, positive toward the right for a right turn.
pub fn lateral_accel(speed_mps: f64, yaw_rate_rps: f64) -> f64 {
    speed_mps * yaw_rate_rps
}

/// Bank angle a passenger would feel for a lateral acceleration, bounded.
pub fn roll_rad(lateral_accel_mps2: f64) -> f64 {
    (lateral_accel_mps2 / GRAVITY_MPS2).clamp(-MAX_ROLL_RAD, MAX_ROLL_RAD)
}

/// Road grade under frame `i`: the arriving segment, or the first one for frame 0.
pub fn pitch_deg(metrics: &[SegmentMetrics], i: usize) -> f64 {
    let idx = if i == 0 { 1 } else { i };
    metrics.get(idx).map_or(0.0, |m| m.slope_deg)
}

/// Build IMU samples for a simulated trace.
pub fn synthesize(states: &[VehicleState], metrics: &[SegmentMetrics], dt: f64) -> Result<Vec<ImuSample>> {
    let headings: Vec<f64> = states.iter().map(|s| s.heading_deg).collect();
    let rates = yaw_rates(&headings, dt)?;

    Ok(states
        .iter()
        .zip(rates)
        .enumerate()
        .map(|(i, (state, yaw_rate))| {
            let lateral = lateral_accel(state.speed_mps, yaw_rate);
            let mut accel = state.accel_body_mps2;
            accel.y = lateral;
            ImuSample {
                gyro_body_rps: Vector3::new(0.0, 0.0, yaw_rate),
                accel_body_mps2: accel,
                pitch_deg: pitch_deg(metrics, i),
                roll_deg: roll_rad(lateral).to_degrees(),
            }
        })
        .collect())
}
