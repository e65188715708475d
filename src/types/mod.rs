pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Geodetic position in degrees (WGS84).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn with_alt(self, alt: f64) -> LatLonAlt {
        LatLonAlt {
            lat: self.lat,
            lon: self.lon,
            alt,
        }
    }
}

/// Geodetic position with height above the ellipsoid in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLonAlt {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl LatLonAlt {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    pub fn horizontal(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// East-North-Up offset in meters from a local anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Enu {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<nalgebra::Vector3<f64>> for Enu {
    fn from(v: nalgebra::Vector3<f64>) -> Self {
        Enu {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}
