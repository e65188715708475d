//! Attribute-derived target speeds: posted limits, functional class, road
//! geometry and grade.
//!
//! Every function returns km/h. Conversion to m/s happens in the planner.

use crate::config::{PlannerConfig, VehicleLimits};
use crate::geodesy::{bearing_radians, haversine_meters, wrap_angle};
use crate::route::{RoutePoint, SegmentMetrics};
use crate::types::LatLon;

/// Everything the heuristics read for one route.
///
/// `geometry` is the advisory (possibly smoothed) position series, used only
/// for turn angles and segment-length road-class inference.
pub struct HeuristicInputs<'a> {
    pub points: &'a [RoutePoint],
    pub geometry: &'a [LatLon],
    pub metrics: &'a [SegmentMetrics],
}

/// Legal ceiling at a point.
pub fn legal_cap_kmh(point: &RoutePoint, planner: &PlannerConfig, vehicle: &VehicleLimits) -> f64 {
    let cap = match (point.speed_limit_kmh, point.functional_class) {
        (Some(limit), _) => limit.max(planner.legal_min_kmh).min(planner.legal_max_kmh),
        (None, Some(1)) => 120.0,
        (None, Some(2)) => 90.0,
        (None, Some(3)) => 82.0,
        (None, Some(_)) => 50.0,
        (None, None) => planner.legal_max_kmh,
    };
    cap.min(vehicle.max_speed_kmh)
}

/// Free-flow speed before grade and turn adjustments.
pub fn free_flow_base_kmh(inputs: &HeuristicInputs, idx: usize, planner: &PlannerConfig) -> f64 {
    let point = &inputs.points[idx];
    if let Some(limit) = point.speed_limit_kmh {
        return limit.max(planner.legal_min_kmh).min(planner.legal_max_kmh);
    }
    match point.functional_class {
        Some(1) => 110.0,
        Some(2) => 90.0,
        Some(3) => 82.0,
        Some(_) => 60.0,
        None => base_from_segment_length(inputs.geometry, idx),
    }
}

/// Longer sampled segments mean a faster road class.
fn base_from_segment_length(geometry: &[LatLon], idx: usize) -> f64 {
    let n = geometry.len();
    if idx <= 2 || idx + 2 >= n {
        return 50.0;
    }
    let distances: Vec<f64> = (idx - 2..idx + 3)
        .filter(|&i| i + 1 < n)
        .map(|i| haversine_meters(geometry[i], geometry[i + 1]))
        .collect();
    if distances.is_empty() {
        return 50.0;
    }
    let average = distances.iter().sum::<f64>() / distances.len() as f64;
    if average > 60.0 {
        90.0
    } else if average > 30.0 {
        70.0
    } else {
        50.0
    }
}

/// Multiplier for road grade in degrees (positive uphill), within [0.6, 1.1].
pub fn slope_factor(slope_deg: f64) -> f64 {
    let factor = if slope_deg > 0.0 {
        (1.0 - 0.03 * slope_deg).max(0.6)
    } else if slope_deg < 0.0 {
        (1.0 - 0.01 * slope_deg).min(1.1)
    } else {
        1.0
    };
    factor.clamp(0.6, 1.1)
}

/// Multiplier for the heading change at a vertex. Major roads (class ≤ 2) have
/// wider curves for the same sampled angle and are penalized less.
pub fn turn_factor(angle_change_rad: f64, functional_class: Option<u8>) -> f64 {
    let angle = angle_change_rad.abs();
    if functional_class.map_or(false, |fc| fc <= 2) {
        if angle > 0.6 {
            0.7
        } else if angle > 0.4 {
            0.85
        } else if angle > 0.15 {
            0.95
        } else {
            1.0
        }
    } else if angle > 0.5 {
        0.4
    } else if angle > 0.3 {
        0.7
    } else if angle > 0.1 {
        0.9
    } else {
        1.0
    }
}

/// Absolute heading change at an interior vertex; zero at the ends.
pub fn turn_angle_at(geometry: &[LatLon], idx: usize) -> f64 {
    if idx == 0 || idx + 1 >= geometry.len() {
        return 0.0;
    }
    let inbound = bearing_radians(geometry[idx - 1], geometry[idx]);
    let outbound = bearing_radians(geometry[idx], geometry[idx + 1]);
    wrap_angle(outbound - inbound).abs()
}

/// Grade of the segment leaving `idx` (the arriving one for the last point).
fn slope_at(metrics: &[SegmentMetrics], idx: usize) -> f64 {
    metrics
        .get(idx + 1)
        .or_else(|| metrics.get(idx))
        .map_or(0.0, |m| m.slope_deg)
}

/// Attribute-derived target speed at `idx`, before legal and curvature caps.
pub fn target_speed_kmh(
    inputs: &HeuristicInputs,
    idx: usize,
    planner: &PlannerConfig,
    vehicle: &VehicleLimits,
) -> f64 {
    let base = free_flow_base_kmh(inputs, idx, planner);
    let functional_class = inputs.points[idx].functional_class;

    let mut target = base
        * slope_factor(slope_at(inputs.metrics, idx))
        * turn_factor(turn_angle_at(inputs.geometry, idx), functional_class)
        * planner.weather_factor;

    // Ring roads and motorways should not collapse on sampled kinks
    if functional_class.map_or(false, |fc| fc <= 2) {
        target = target.max((base * 0.7).min(80.0));
    }

    target
        .max(planner.heuristic_floor_kmh)
        .min(vehicle.max_speed_kmh)
}
