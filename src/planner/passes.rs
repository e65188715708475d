//! Speed-profile relaxation passes.
//!
//! Every pass takes its input by slice and returns a fresh sequence so each
//! stage can be inspected and tested on its own. Speeds are m/s and all
//! sequences are index-aligned with the route points. `segment_m[i]` is the
//! length of the segment ending at point `i` (`segment_m[0]` is unused).

use crate::config::{PlannerConfig, VehicleLimits};

/// Dynamic bounds shared by the forward and backward passes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassLimits {
    pub accel_mps2: f64,
    pub brake_mps2: f64,
    pub min_segment_m: f64,
    pub min_segment_time_s: f64,
    pub min_reference_speed_mps: f64,
}

impl PassLimits {
    pub fn new(vehicle: &VehicleLimits, planner: &PlannerConfig) -> Self {
        Self {
            accel_mps2: vehicle.accel_mps2,
            brake_mps2: vehicle.brake_mps2,
            min_segment_m: planner.min_segment_m,
            min_segment_time_s: planner.min_segment_time_s,
            min_reference_speed_mps: planner.min_reference_speed_mps,
        }
    }

    /// Time to cover `distance_m` at `reference_mps`, with floors on all three terms.
    pub fn segment_time(&self, distance_m: f64, reference_mps: f64) -> f64 {
        let distance = distance_m.max(self.min_segment_m);
        let speed = reference_mps.max(self.min_reference_speed_mps);
        (distance / speed).max(self.min_segment_time_s)
    }
}

/// Lateral-acceleration cap `sqrt(a_lat / κ)`; straight points keep their target.
pub fn curvature_cap(targets: &[f64], curvature: &[f64], lateral_accel_mps2: f64, epsilon: f64) -> Vec<f64> {
    targets
        .iter()
        .zip(curvature)
        .map(|(&target, &kappa)| {
            if kappa > epsilon {
                target.min((lateral_accel_mps2 / kappa).sqrt())
            } else {
                target
            }
        })
        .collect()
}

/// Clamp every value into `[floor, ceilings[i]]`, floor winning on conflict.
pub fn clamp_band(speeds: &[f64], ceilings: &[f64], floor: f64) -> Vec<f64> {
    speeds
        .iter()
        .zip(ceilings)
        .map(|(&v, &ceiling)| v.min(ceiling).max(floor))
        .collect()
}

/// Start→end: no point may exceed its predecessor plus what the vehicle can
/// gain over the segment at the predecessor's resolved speed.
pub fn forward_pass(caps: &[f64], segment_m: &[f64], limits: &PassLimits) -> Vec<f64> {
    let mut out = Vec::with_capacity(caps.len());
    let Some(&first) = caps.first() else {
        return out;
    };
    out.push(first);

    for i in 1..caps.len() {
        let prev = out[i - 1];
        let t_est = limits.segment_time(segment_m[i], prev);
        out.push(caps[i].min(prev + limits.accel_mps2 * t_est));
    }
    out
}

/// Whether point `i` lies in the arrival window of `corridor_m` meters.
pub fn in_final_corridor(cumulative_m: &[f64], i: usize, corridor_m: f64) -> bool {
    let total = cumulative_m.last().copied().unwrap_or(0.0);
    total - cumulative_m[i] <= corridor_m
}

/// Inside the final corridor speeds may not drop from one point to the next,
/// except where a point's own ceiling forces it.
pub fn final_corridor_pass(speeds: &[f64], ceilings: &[f64], cumulative_m: &[f64], corridor_m: f64) -> Vec<f64> {
    let mut out = speeds.to_vec();
    for i in 1..out.len() {
        if in_final_corridor(cumulative_m, i, corridor_m) {
            out[i] = out[i].max(out[i - 1].min(ceilings[i]));
        }
    }
    out
}

/// End→start: no point may exceed its successor plus what the vehicle can
/// shed over the segment. Points in the final corridor are left alone.
pub fn backward_pass(
    speeds: &[f64],
    segment_m: &[f64],
    cumulative_m: &[f64],
    corridor_m: f64,
    limits: &PassLimits,
) -> Vec<f64> {
    let mut out = speeds.to_vec();
    let n = out.len();
    if n < 2 {
        return out;
    }

    for i in (0..n - 1).rev() {
        if in_final_corridor(cumulative_m, i, corridor_m) {
            continue;
        }
        let next = out[i + 1];
        let t_est = limits.segment_time(segment_m[i + 1], next);
        out[i] = out[i].min(next + limits.brake_mps2 * t_est);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> PassLimits {
        PassLimits::new(&VehicleLimits::default(), &PlannerConfig::default())
    }

    fn cumulative(segment_m: &[f64]) -> Vec<f64> {
        segment_m
            .iter()
            .scan(0.0, |acc, d| {
                *acc += d;
                Some(*acc)
            })
            .collect()
    }

    #[test]
    fn test_segment_time_floors() {
        let l = limits();
        assert!((l.segment_time(100.0, 10.0) - 10.0).abs() < 1e-12);
        // Zero-length segment still takes the minimum time
        assert_eq!(l.segment_time(0.0, 10.0), 0.3);
        // Near-zero speed uses the reference floor
        assert!((l.segment_time(10.0, 0.0) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_curvature_cap() {
        let out = curvature_cap(&[30.0, 30.0, 30.0], &[0.0, 0.01, 1e-12], 1.5, 1e-9);
        assert_eq!(out[0], 30.0);
        assert!((out[1] - 150.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(out[2], 30.0);
    }

    #[test]
    fn test_forward_pass_limits_acceleration() {
        let caps = vec![1.0, 30.0, 30.0, 30.0];
        let segs = vec![0.0, 10.0, 10.0, 10.0];
        let l = limits();
        let out = forward_pass(&caps, &segs, &l);

        assert_eq!(out[0], 1.0);
        for i in 1..out.len() {
            let bound = out[i - 1] + l.accel_mps2 * l.segment_time(segs[i], out[i - 1]);
            assert!(out[i] <= bound + 1e-12);
            assert!(out[i] <= caps[i]);
        }
        assert!(out[1] > out[0] && out[1] < 30.0);
        // Input untouched
        assert_eq!(caps[1], 30.0);
    }

    #[test]
    fn test_backward_pass_limits_braking() {
        let speeds = vec![30.0, 30.0, 30.0, 5.0, 30.0];
        let segs = vec![0.0, 20.0, 20.0, 20.0, 1000.0];
        let cum = cumulative(&segs);
        let l = limits();
        let out = backward_pass(&speeds, &segs, &cum, 300.0, &l);

        for i in 0..3 {
            let bound = out[i + 1] + l.brake_mps2 * l.segment_time(segs[i + 1], out[i + 1]);
            assert!(out[i] <= bound + 1e-12);
        }
        assert!(out[2] < 30.0, "should brake ahead of the dip");
        assert_eq!(out[3], 5.0);
        assert_eq!(out[4], 30.0);
    }

    #[test]
    fn test_backward_pass_skips_final_corridor() {
        // Last 300 m holds a dip that would otherwise force braking
        let speeds = vec![20.0, 3.0, 20.0, 3.0, 20.0];
        let segs = vec![0.0, 10.0, 100.0, 100.0, 100.0];
        let cum = cumulative(&segs);
        let out = backward_pass(&speeds, &segs, &cum, 300.0, &limits());
        assert_eq!(&out[1..], &speeds[1..]);
        // Only the point outside the window brakes for its successor
        assert!(out[0] < 20.0);
    }

    #[test]
    fn test_final_corridor_is_non_decreasing() {
        let speeds = vec![10.0, 20.0, 8.0, 15.0, 12.0];
        let ceilings = vec![30.0, 30.0, 30.0, 30.0, 14.0];
        let segs = vec![0.0, 500.0, 50.0, 50.0, 50.0];
        let cum = cumulative(&segs);
        let out = final_corridor_pass(&speeds, &ceilings, &cum, 300.0);

        assert_eq!(&out[0..2], &speeds[0..2]);
        assert_eq!(out[2], 20.0);
        assert_eq!(out[3], 20.0);
        // Ceiling wins over monotonicity
        assert_eq!(out[4], 14.0);
    }

    #[test]
    fn test_clamp_band() {
        let out = clamp_band(&[0.0, 50.0, 10.0], &[30.0, 30.0, 30.0], 0.5);
        assert_eq!(out, vec![0.5, 30.0, 10.0]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(forward_pass(&[], &[], &limits()).is_empty());
        assert!(backward_pass(&[], &[], &[], 300.0, &limits()).is_empty());
    }
}
