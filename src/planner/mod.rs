//! Curvature- and limit-aware speed planning.
//!
//! Stages, each kept as its own sequence in [`SpeedPlan`]:
//! legal caps → attribute targets → curvature cap + crawl floor →
//! forward (accel) pass → final-corridor pass → backward (brake) pass.

pub mod heuristics;
pub mod passes;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{PlannerConfig, VehicleLimits};
use crate::geodesy::curvature_series;
use crate::route::{cumulative_distance, total_distance_m, Route, SegmentMetrics};
use crate::types::LatLon;

use heuristics::{legal_cap_kmh, target_speed_kmh, HeuristicInputs};
use passes::{backward_pass, clamp_band, curvature_cap, final_corridor_pass, forward_pass, PassLimits};

/// Per-point target speed in m/s, index-aligned with the route.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeedProfile(Vec<f64>);

impl SpeedProfile {
    pub fn new(speeds: Vec<f64>) -> Self {
        Self(speeds)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        self.0.get(i).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    pub fn min(&self) -> f64 {
        self.0.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.0.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Output of one planning run, every intermediate stage included.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeedPlan {
    /// Legal ceiling per point, never above vehicle max (m/s)
    pub legal_caps_mps: Vec<f64>,
    /// Attribute target after the legal cap (m/s)
    pub targets_mps: Vec<f64>,
    /// Planar curvature of the raw route geometry (1/m)
    pub curvature: Vec<f64>,
    /// Targets after curvature cap and crawl floor (m/s)
    pub capped_mps: Vec<f64>,
    pub forward_mps: Vec<f64>,
    pub corridor_mps: Vec<f64>,
    /// Final profile (backward pass output)
    pub profile: SpeedProfile,
    pub distance_m: f64,
    /// Travel time along the profile (minutes)
    pub eta_min: f64,
}

pub struct SpeedPlanner {
    vehicle: VehicleLimits,
    config: PlannerConfig,
}

impl SpeedPlanner {
    pub fn new(vehicle: VehicleLimits, config: PlannerConfig) -> Self {
        Self { vehicle, config }
    }

    pub fn vehicle(&self) -> &VehicleLimits {
        &self.vehicle
    }

    /// Plan a route. `advisory` is the position series the turn and
    /// segment-length heuristics read; pass the raw positions to skip smoothing.
    pub fn plan(&self, route: &Route, metrics: &[SegmentMetrics], advisory: &[LatLon]) -> SpeedPlan {
        let points = route.points();
        let inputs = HeuristicInputs {
            points,
            geometry: advisory,
            metrics,
        };

        let legal_caps_mps: Vec<f64> = points
            .iter()
            .map(|p| legal_cap_kmh(p, &self.config, &self.vehicle) / 3.6)
            .collect();

        let targets_mps: Vec<f64> = (0..points.len())
            .map(|i| target_speed_kmh(&inputs, i, &self.config, &self.vehicle) / 3.6)
            .zip(&legal_caps_mps)
            .map(|(target, &cap)| target.min(cap))
            .collect();

        let curvature = curvature_series(&route.positions());
        let curved = curvature_cap(
            &targets_mps,
            &curvature,
            self.vehicle.lateral_accel_mps2,
            self.config.curvature_epsilon,
        );
        let capped_mps = clamp_band(&curved, &legal_caps_mps, self.vehicle.min_crawl_mps());

        let segment_m: Vec<f64> = metrics.iter().map(|m| m.distance_m).collect();
        let cumulative_m = cumulative_distance(metrics);
        let limits = PassLimits::new(&self.vehicle, &self.config);
        let corridor = self.config.final_corridor_m;

        let forward_mps = forward_pass(&capped_mps, &segment_m, &limits);
        let corridor_mps = final_corridor_pass(&forward_mps, &legal_caps_mps, &cumulative_m, corridor);
        let profile = SpeedProfile::new(backward_pass(
            &corridor_mps,
            &segment_m,
            &cumulative_m,
            corridor,
            &limits,
        ));

        let distance_m = total_distance_m(metrics);
        let eta_min = eta_minutes(profile.as_slice(), metrics);

        debug!(
            "Planned {} points over {:.0} m: {:.1}..{:.1} m/s, ETA {:.2} min",
            profile.len(),
            distance_m,
            profile.min(),
            profile.max(),
            eta_min
        );

        SpeedPlan {
            legal_caps_mps,
            targets_mps,
            curvature,
            capped_mps,
            forward_mps,
            corridor_mps,
            profile,
            distance_m,
            eta_min,
        }
    }
}

/// Travel time in minutes over a speed trace, averaging the speeds at each
/// segment's ends and flooring the average at 0.1 m/s.
pub fn eta_minutes(speeds_mps: &[f64], metrics: &[SegmentMetrics]) -> f64 {
    let seconds: f64 = (1..speeds_mps.len().min(metrics.len()))
        .map(|i| {
            let avg = ((speeds_mps[i - 1] + speeds_mps[i]) / 2.0).max(0.1);
            metrics[i].distance_m / avg
        })
        .sum();
    seconds / 60.0
}
