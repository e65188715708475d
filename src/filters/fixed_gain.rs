use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::types::LatLon;

/// Advisory position produced by [`FixedGainSmoother`].
///
/// Only ever used as input to road-attribute heuristics, never as ground truth.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusedPosition {
    pub lat: f64,
    pub lon: f64,
    pub accuracy_m: f64,
}

impl FusedPosition {
    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// Cheap lat/lon smoother with a constant blending gain.
///
/// Each new sample pulls the previous estimate `gain` of the way toward
/// itself. No dynamics model and no covariance.
pub struct FixedGainSmoother {
    gain: f64,
    accuracy_m: f64,
    last: Option<LatLon>,
}

impl FixedGainSmoother {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            gain: config.advisory_gain,
            accuracy_m: config.advisory_accuracy_m,
            last: None,
        }
    }

    pub fn apply(&mut self, raw: LatLon) -> FusedPosition {
        let (fused, accuracy_m) = match self.last {
            None => (raw, self.accuracy_m * 0.8),
            Some(prev) => (
                LatLon::new(
                    prev.lat + self.gain * (raw.lat - prev.lat),
                    prev.lon + self.gain * (raw.lon - prev.lon),
                ),
                self.accuracy_m * 0.6,
            ),
        };
        self.last = Some(fused);
        FusedPosition {
            lat: fused.lat,
            lon: fused.lon,
            accuracy_m,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Smooth a whole sequence from a fresh state.
pub fn smooth_advisory(config: &FilterConfig, points: &[LatLon]) -> Vec<FusedPosition> {
    let mut smoother = FixedGainSmoother::new(config);
    points.iter().map(|p| smoother.apply(*p)).collect()
}
