//! Route ingestion: fixed-shape route points, validation and per-segment metrics.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};
use crate::geodesy::{bearing_radians, haversine_meters, slope_degrees};
use crate::types::{LatLon, LatLonAlt};

/// Highest functional class number accepted (1 = motorway).
pub const MAX_FUNCTIONAL_CLASS: u8 = 5;

/// One sampled location along the route, as decoded from the routing provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(default, alias = "speed_limit_kmh", skip_serializing_if = "Option::is_none")]
    pub speed_limit_kmh: Option<f64>,
    #[serde(default, alias = "functional_class", skip_serializing_if = "Option::is_none")]
    pub functional_class: Option<u8>,
    #[serde(default, alias = "road_category", skip_serializing_if = "Option::is_none")]
    pub road_category: Option<String>,
}

impl RoutePoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            elevation: None,
            speed_limit_kmh: None,
            functional_class: None,
            road_category: None,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_speed_limit(mut self, kmh: f64) -> Self {
        self.speed_limit_kmh = Some(kmh);
        self
    }

    pub fn with_functional_class(mut self, class: u8) -> Self {
        self.functional_class = Some(class);
        self
    }

    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }

    /// Position with elevation, missing elevation read as sea level.
    pub fn position_with_alt(&self) -> LatLonAlt {
        LatLonAlt::new(self.lat, self.lon, self.elevation.unwrap_or(0.0))
    }

    fn validate(&self, index: usize) -> Result<()> {
        let invalid = |reason: String| TrajectoryError::InvalidPoint { index, reason };

        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(invalid(format!("latitude {} out of range", self.lat)));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(invalid(format!("longitude {} out of range", self.lon)));
        }
        if let Some(elevation) = self.elevation {
            if !elevation.is_finite() {
                return Err(invalid("elevation is not finite".to_string()));
            }
        }
        if let Some(limit) = self.speed_limit_kmh {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(invalid(format!("speed limit {limit} km/h is not positive")));
            }
        }
        if let Some(class) = self.functional_class {
            if !(1..=MAX_FUNCTIONAL_CLASS).contains(&class) {
                return Err(invalid(format!(
                    "functional class {class} outside 1..={MAX_FUNCTIONAL_CLASS}"
                )));
            }
        }
        Ok(())
    }
}

/// Route as submitted by a caller: points plus an optional separate speed-limit array.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInput {
    pub points: Vec<RoutePoint>,
    /// Per-point (or per-segment) limits in m/s; overrides per-point limits when present.
    #[serde(default, alias = "speed_limit_mps", skip_serializing_if = "Option::is_none")]
    pub speed_limits_mps: Option<Vec<f64>>,
}

impl RouteInput {
    pub fn into_route(self) -> Result<Route> {
        let mut points = self.points;
        if let Some(limits) = self.speed_limits_mps {
            let per_point = normalize_speed_limits(&limits, points.len())?;
            for (point, mps) in points.iter_mut().zip(per_point) {
                point.speed_limit_kmh = Some(mps * 3.6);
            }
        }
        Route::new(points)
    }
}

/// Reconcile a speed-limit array with the point count.
///
/// Per-point arrays pass through. One value per segment is turned into one per
/// point by duplicating the first value. Any other length is rejected.
pub fn normalize_speed_limits(limits: &[f64], points: usize) -> Result<Vec<f64>> {
    if limits.is_empty() {
        return Err(TrajectoryError::SpeedLimitMismatch { limits: 0, points });
    }
    if limits.len() == points {
        Ok(limits.to_vec())
    } else if limits.len() + 1 == points {
        let mut per_point = Vec::with_capacity(points);
        per_point.push(limits[0]);
        per_point.extend_from_slice(limits);
        Ok(per_point)
    } else {
        Err(TrajectoryError::SpeedLimitMismatch {
            limits: limits.len(),
            points,
        })
    }
}

/// Validated, immutable route with at least two points.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    points: Vec<RoutePoint>,
}

impl Route {
    pub fn new(points: Vec<RoutePoint>) -> Result<Self> {
        if points.len() < 2 {
            return Err(TrajectoryError::RouteTooShort {
                points: points.len(),
            });
        }
        for (index, point) in points.iter().enumerate() {
            point.validate(index)?;
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn positions(&self) -> Vec<LatLon> {
        self.points.iter().map(RoutePoint::position).collect()
    }

    pub fn positions_with_alt(&self) -> Vec<LatLonAlt> {
        self.points.iter().map(RoutePoint::position_with_alt).collect()
    }
}

/// Distance, bearing and grade of the segment ending at each point.
///
/// Index 0 has no predecessor and is all zeros.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    pub distance_m: f64,
    pub bearing_rad: f64,
    pub slope_deg: f64,
}

impl SegmentMetrics {
    pub fn between(a: LatLonAlt, b: LatLonAlt) -> Self {
        Self {
            distance_m: haversine_meters(a.horizontal(), b.horizontal()),
            bearing_rad: bearing_radians(a.horizontal(), b.horizontal()),
            slope_deg: slope_degrees(a, b),
        }
    }
}

/// Index-aligned segment metrics for a series of positions.
pub fn segment_metrics(positions: &[LatLonAlt]) -> Vec<SegmentMetrics> {
    let mut metrics = vec![SegmentMetrics::default(); positions.len()];
    for i in 1..positions.len() {
        metrics[i] = SegmentMetrics::between(positions[i - 1], positions[i]);
    }
    metrics
}

/// Distance travelled from the first point to each point.
pub fn cumulative_distance(metrics: &[SegmentMetrics]) -> Vec<f64> {
    metrics
        .iter()
        .scan(0.0, |total, m| {
            *total += m.distance_m;
            Some(*total)
        })
        .collect()
}

pub fn total_distance_m(metrics: &[SegmentMetrics]) -> f64 {
    metrics.iter().map(|m| m.distance_m).sum()
}
