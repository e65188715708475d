//! Geodesy kit: great-circle distance, bearing, slope, ECEF/ENU transforms,
//! discrete curvature and polyline projection.
//!
//! Everything here is a pure function of its arguments.

use std::f64::consts::{PI, TAU};

use geo::{Coord, LineString};
use nalgebra::{Matrix3, Vector3};

use crate::types::{LatLon, LatLonAlt};

/// Mean Earth radius used for every spherical distance in the crate.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// WGS84 semi-major axis (equatorial radius) in meters
const WGS84_A: f64 = 6_378_137.0;

/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// WGS84 semi-minor axis in meters
const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

/// WGS84 first eccentricity squared
const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// WGS84 second eccentricity squared
const WGS84_EP2: f64 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);

/// Great-circle distance in meters, altitude ignored.
pub fn haversine_meters(p1: LatLon, p2: LatLon) -> f64 {
    let d_lat = (p2.lat - p1.lat).to_radians();
    let d_lon = (p2.lon - p1.lon).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + p1.lat.to_radians().cos() * p2.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Sum of great-circle segment lengths.
pub fn polyline_length_m(poly: &[LatLon]) -> f64 {
    poly.windows(2)
        .map(|pair| haversine_meters(pair[0], pair[1]))
        .sum()
}

/// Initial bearing from `p1` to `p2` in radians, clockwise from north, in (-π, π].
pub fn bearing_radians(p1: LatLon, p2: LatLon) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let d_lon = (p2.lon - p1.lon).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    let bearing = y.atan2(x);
    if bearing <= -PI {
        bearing + TAU
    } else {
        bearing
    }
}

/// Normalize any angle into [-π, π].
///
/// Uses Euclidean remainder so inputs many turns out of range cost the same
/// as inputs already in range.
pub fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Road grade between two points in degrees. Zero when the points coincide horizontally.
pub fn slope_degrees(p1: LatLonAlt, p2: LatLonAlt) -> f64 {
    let horizontal = haversine_meters(p1.horizontal(), p2.horizontal());
    if horizontal == 0.0 {
        return 0.0;
    }
    (p2.alt - p1.alt).atan2(horizontal).to_degrees()
}

/// WGS84 geodetic → Earth-Centered-Earth-Fixed (meters).
pub fn geodetic_to_ecef(p: LatLonAlt) -> Vector3<f64> {
    let lat = p.lat.to_radians();
    let lon = p.lon.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    // Radius of curvature in the prime vertical
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    Vector3::new(
        (n + p.alt) * cos_lat * cos_lon,
        (n + p.alt) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + p.alt) * sin_lat,
    )
}

/// ECEF → WGS84 geodetic using Bowring's single-step formula (sub-millimeter near the surface).
pub fn ecef_to_geodetic(ecef: &Vector3<f64>) -> LatLonAlt {
    let lon = ecef.y.atan2(ecef.x);
    let p = ecef.x.hypot(ecef.y);
    let theta = (WGS84_A * ecef.z).atan2(WGS84_B * p);
    let (sin_th, cos_th) = theta.sin_cos();

    let lat = (ecef.z + WGS84_EP2 * WGS84_B * sin_th.powi(3))
        .atan2(p - WGS84_E2 * WGS84_A * cos_th.powi(3));
    let sin_lat = lat.sin();
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let alt = p / lat.cos() - n;

    LatLonAlt::new(lat.to_degrees(), lon.to_degrees(), alt)
}

/// Rotation taking ECEF deltas into the ENU frame at `anchor`.
fn enu_rotation(anchor: LatLonAlt) -> Matrix3<f64> {
    let (sin_lat, cos_lat) = anchor.lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = anchor.lon.to_radians().sin_cos();
    Matrix3::new(
        -sin_lon,
        cos_lon,
        0.0,
        -sin_lat * cos_lon,
        -sin_lat * sin_lon,
        cos_lat,
        cos_lat * cos_lon,
        cos_lat * sin_lon,
        sin_lat,
    )
}

/// ECEF point → East-North-Up offset from `anchor`.
pub fn ecef_to_enu(ecef: &Vector3<f64>, anchor: LatLonAlt) -> Vector3<f64> {
    let delta = ecef - geodetic_to_ecef(anchor);
    enu_rotation(anchor) * delta
}

/// East-North-Up offset from `anchor` → ECEF point.
pub fn enu_to_ecef(enu: &Vector3<f64>, anchor: LatLonAlt) -> Vector3<f64> {
    geodetic_to_ecef(anchor) + enu_rotation(anchor).transpose() * enu
}

pub fn enu_to_geodetic(enu: &Vector3<f64>, anchor: LatLonAlt) -> LatLonAlt {
    ecef_to_geodetic(&enu_to_ecef(enu, anchor))
}

/// ENU coordinates of a whole series, anchored at its first point.
pub fn lla_to_enu_series(poly: &[LatLonAlt]) -> Vec<Vector3<f64>> {
    let Some(&anchor) = poly.first() else {
        return Vec::new();
    };
    poly.iter()
        .map(|p| ecef_to_enu(&geodetic_to_ecef(*p), anchor))
        .collect()
}

/// Planar (east, north) offset of `p` from `anchor`, both on the ellipsoid surface.
pub fn local_xy(p: LatLon, anchor: LatLon) -> (f64, f64) {
    let enu = ecef_to_enu(&geodetic_to_ecef(p.with_alt(0.0)), anchor.with_alt(0.0));
    (enu.x, enu.y)
}

/// Inverse of [`local_xy`].
pub fn from_local_xy(x: f64, y: f64, anchor: LatLon) -> LatLon {
    enu_to_geodetic(&Vector3::new(x, y, 0.0), anchor.with_alt(0.0)).horizontal()
}

/// Per-vertex planar curvature (1/m) from the Menger curvature of each vertex triple.
///
/// Computed in the ENU plane of the first vertex. Endpoints copy their interior
/// neighbour; degenerate triangles give zero.
pub fn curvature_series(poly: &[LatLon]) -> Vec<f64> {
    let n = poly.len();
    if n < 3 {
        return vec![0.0; n];
    }

    let lla: Vec<LatLonAlt> = poly.iter().map(|p| p.with_alt(0.0)).collect();
    let enu = lla_to_enu_series(&lla);

    let mut kappa = vec![0.0; n];
    for i in 1..n - 1 {
        let (p1, p2, p3) = (enu[i - 1], enu[i], enu[i + 1]);
        let a = (p2.x - p1.x).hypot(p2.y - p1.y);
        let b = (p3.x - p2.x).hypot(p3.y - p2.y);
        let c = (p3.x - p1.x).hypot(p3.y - p1.y);
        let denom = a * b * c;
        if denom == 0.0 {
            continue;
        }
        // Twice the triangle area
        let area2 = ((p2.x - p1.x) * (p3.y - p1.y) - (p2.y - p1.y) * (p3.x - p1.x)).abs();
        kappa[i] = 2.0 * area2 / denom;
    }
    kappa[0] = kappa[1];
    kappa[n - 1] = kappa[n - 2];
    kappa
}

/// Closest point on any segment of `polyline`, with its great-circle distance from `point`.
///
/// Projection is done in raw lon/lat space (clamped to each segment), which is
/// only a good approximation for short segments. `None` for an empty polyline.
pub fn nearest_point_on_polyline(point: LatLon, polyline: &[LatLon]) -> Option<(LatLon, f64)> {
    let first = *polyline.first()?;
    if polyline.len() == 1 {
        return Some((first, haversine_meters(point, first)));
    }

    let line: LineString<f64> = polyline
        .iter()
        .map(|p| Coord { x: p.lon, y: p.lat })
        .collect::<Vec<_>>()
        .into();
    let target = Coord {
        x: point.lon,
        y: point.lat,
    };

    let mut best: Option<(LatLon, f64)> = None;
    for segment in line.lines() {
        let delta = segment.delta();
        let len_sq = delta.x * delta.x + delta.y * delta.y;
        let closest = if len_sq == 0.0 {
            segment.start
        } else {
            let offset = target - segment.start;
            let t = ((offset.x * delta.x + offset.y * delta.y) / len_sq).clamp(0.0, 1.0);
            segment.start + delta * t
        };

        let candidate = LatLon::new(closest.y, closest.x);
        let distance = haversine_meters(point, candidate);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_haversine_symmetric_and_zero() {
        let a = LatLon::new(41.0, 29.0);
        let b = LatLon::new(41.01, 29.02);
        assert_eq!(haversine_meters(a, a), 0.0);
        assert_abs_diff_eq!(haversine_meters(a, b), haversine_meters(b, a), epsilon = 1e-9);
    }

    #[test]
    fn test_haversine_one_millidegree_on_equator() {
        // 0.001° of longitude at the equator on a 6371 km sphere
        let d = haversine_meters(LatLon::new(0.0, 0.0), LatLon::new(0.0, 0.001));
        assert_abs_diff_eq!(d, 111.195, epsilon = 0.01);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = LatLon::new(0.0, 0.0);
        assert_abs_diff_eq!(bearing_radians(origin, LatLon::new(1.0, 0.0)), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            bearing_radians(origin, LatLon::new(0.0, 1.0)),
            PI / 2.0,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            bearing_radians(origin, LatLon::new(0.0, -1.0)),
            -PI / 2.0,
            epsilon = 1e-12
        );
        // Due south lands on +π, never -π
        let south = bearing_radians(origin, LatLon::new(-1.0, 0.0));
        assert!(south > 0.0);
        assert_abs_diff_eq!(south, PI, epsilon = 1e-12);
    }

    #[test]
    fn test_wrap_angle_range_and_periodicity() {
        for &x in &[0.0, 1.0, -1.0, 3.0, -3.0, 3.2, -3.2, 100.0, -250.5] {
            let w = wrap_angle(x);
            assert!((-PI..=PI).contains(&w), "wrap_angle({x}) = {w}");
            for k in [-1000i32, -3, -1, 1, 2, 1000] {
                let shifted = wrap_angle(x + TAU * k as f64);
                assert_abs_diff_eq!(shifted, w, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_wrap_angle_huge_input() {
        let w = wrap_angle(1.0e9);
        assert!((-PI..=PI).contains(&w));
    }

    #[test]
    fn test_slope_degrees() {
        let a = LatLonAlt::new(0.0, 0.0, 0.0);
        let b = LatLonAlt::new(0.0, 0.001, 111.195);
        assert_abs_diff_eq!(slope_degrees(a, b), 45.0, epsilon = 0.01);
        assert_abs_diff_eq!(slope_degrees(b, a), -45.0, epsilon = 0.01);
        // Vertical stack: defined as zero
        assert_eq!(slope_degrees(a, LatLonAlt::new(0.0, 0.0, 50.0)), 0.0);
    }

    #[test]
    fn test_ecef_equator_prime_meridian() {
        let ecef = geodetic_to_ecef(LatLonAlt::new(0.0, 0.0, 0.0));
        assert_abs_diff_eq!(ecef.x, WGS84_A, epsilon = 1e-6);
        assert_abs_diff_eq!(ecef.y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ecef.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_anchor_maps_to_origin() {
        for anchor in [
            LatLonAlt::new(41.015, 28.979, 35.0),
            LatLonAlt::new(-33.9, 151.2, 0.0),
            LatLonAlt::new(0.0, 0.0, 1200.0),
        ] {
            let enu = ecef_to_enu(&geodetic_to_ecef(anchor), anchor);
            assert_abs_diff_eq!(enu.norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_enu_axes() {
        let anchor = LatLonAlt::new(0.0, 0.0, 0.0);
        let east = ecef_to_enu(&geodetic_to_ecef(LatLonAlt::new(0.0, 0.001, 0.0)), anchor);
        assert!(east.x > 100.0);
        assert_abs_diff_eq!(east.y, 0.0, epsilon = 1e-6);

        let north = ecef_to_enu(&geodetic_to_ecef(LatLonAlt::new(0.001, 0.0, 0.0)), anchor);
        assert!(north.y > 100.0);
        assert_abs_diff_eq!(north.x, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_geodetic_round_trip() {
        let anchor = LatLonAlt::new(39.92, 32.85, 900.0);
        let p = LatLonAlt::new(39.93, 32.87, 950.0);
        let enu = ecef_to_enu(&geodetic_to_ecef(p), anchor);
        let back = enu_to_geodetic(&enu, anchor);
        assert_abs_diff_eq!(back.lat, p.lat, epsilon = 1e-9);
        assert_abs_diff_eq!(back.lon, p.lon, epsilon = 1e-9);
        assert_abs_diff_eq!(back.alt, p.alt, epsilon = 1e-3);
    }

    #[test]
    fn test_local_xy_inverse() {
        let anchor = LatLon::new(41.0, 29.0);
        let (x, y) = local_xy(LatLon::new(41.002, 29.003), anchor);
        let back = from_local_xy(x, y, anchor);
        assert_abs_diff_eq!(back.lat, 41.002, epsilon = 1e-7);
        assert_abs_diff_eq!(back.lon, 29.003, epsilon = 1e-7);
    }

    #[test]
    fn test_enu_series_anchored_at_first() {
        let series = lla_to_enu_series(&[
            LatLonAlt::new(10.0, 20.0, 5.0),
            LatLonAlt::new(10.001, 20.0, 5.0),
        ]);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0], Vector3::zeros());
        assert!(lla_to_enu_series(&[]).is_empty());
    }

    #[test]
    fn test_curvature_straight_line_is_zero() {
        let poly: Vec<LatLon> = (0..6).map(|i| LatLon::new(0.0, 0.001 * i as f64)).collect();
        for k in curvature_series(&poly) {
            assert_abs_diff_eq!(k, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_curvature_right_angle() {
        // Legs of ~111 m meeting at 90°: circumradius = hypotenuse / 2
        let poly = [
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 0.001),
            LatLon::new(0.001, 0.001),
        ];
        let kappa = curvature_series(&poly);
        let hyp = 2.0f64.sqrt() * 111.32;
        assert_abs_diff_eq!(kappa[1], 2.0 / hyp, epsilon = 2e-4);
        assert_eq!(kappa[0], kappa[1]);
        assert_eq!(kappa[2], kappa[1]);
    }

    #[test]
    fn test_curvature_degenerate_and_short() {
        assert_eq!(curvature_series(&[LatLon::new(0.0, 0.0)]), vec![0.0]);
        let dup = [LatLon::new(0.0, 0.0), LatLon::new(0.0, 0.0), LatLon::new(0.0, 0.001)];
        assert_eq!(curvature_series(&dup), vec![0.0; 3]);
    }

    #[test]
    fn test_nearest_point_on_polyline() {
        let poly = [LatLon::new(0.0, 0.0), LatLon::new(0.0, 0.002)];
        let (p, d) = nearest_point_on_polyline(LatLon::new(0.0005, 0.001), &poly).unwrap();
        assert_abs_diff_eq!(p.lat, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.lon, 0.001, epsilon = 1e-12);
        assert_abs_diff_eq!(d, 55.6, epsilon = 0.1);

        // Beyond the end clamps to the last vertex
        let (p, _) = nearest_point_on_polyline(LatLon::new(0.0, 0.01), &poly).unwrap();
        assert_abs_diff_eq!(p.lon, 0.002, epsilon = 1e-12);
    }

    #[test]
    fn test_nearest_point_picks_global_minimum() {
        let poly = [
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 0.01),
            LatLon::new(0.01, 0.01),
        ];
        let (p, _) = nearest_point_on_polyline(LatLon::new(0.005, 0.0099), &poly).unwrap();
        assert_abs_diff_eq!(p.lon, 0.01, epsilon = 1e-12);
        assert_abs_diff_eq!(p.lat, 0.005, epsilon = 1e-12);
    }

    #[test]
    fn test_nearest_point_edge_cases() {
        assert!(nearest_point_on_polyline(LatLon::new(0.0, 0.0), &[]).is_none());
        let single = [LatLon::new(1.0, 1.0)];
        let (p, d) = nearest_point_on_polyline(LatLon::new(1.0, 1.0), &single).unwrap();
        assert_eq!(p, single[0]);
        assert_eq!(d, 0.0);
    }
}
