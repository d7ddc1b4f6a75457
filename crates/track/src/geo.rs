//! GPS <-> local planar frame conversion around a single fixed reference point.
//!
//! Deltas are taken in thousandths of a degree, the precision the trackers report in,
//! and scaled per axis before rotating by the circuit's heading.

use race_model::Point2;
use serde::{Deserialize, Serialize};

/// Mean equatorial radius used for the meters-per-degree factors.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Meters per thousandth of a degree of (latitude, longitude) at `reference_latitude`.
pub fn meters_per_millidegree(reference_latitude: f64) -> (f64, f64) {
    let lat = std::f64::consts::PI / 180.0 * EARTH_RADIUS_M / 1000.0;
    let lon = lat * reference_latitude.to_radians().cos();
    (lat, lon)
}

/// Local frame anchored on the start/finish line. Built once per deployment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoFrame {
    reference: GeoPoint,
    cos_rot: f64,
    sin_rot: f64,
    m_per_mdeg_lat: f64,
    m_per_mdeg_lon: f64,
}

impl GeoFrame {
    pub fn new(reference: GeoPoint, rotation_deg: f64) -> Self {
        let (m_per_mdeg_lat, m_per_mdeg_lon) = meters_per_millidegree(reference.latitude);
        let theta = rotation_deg.to_radians();
        Self {
            reference,
            cos_rot: theta.cos(),
            sin_rot: theta.sin(),
            m_per_mdeg_lat,
            m_per_mdeg_lon,
        }
    }

    pub fn reference(&self) -> GeoPoint {
        self.reference
    }

    pub fn to_local(&self, fix: GeoPoint) -> Point2 {
        let d_lat_m = (fix.latitude - self.reference.latitude) * 1000.0 * self.m_per_mdeg_lat;
        let d_lon_m = (fix.longitude - self.reference.longitude) * 1000.0 * self.m_per_mdeg_lon;
        // counter-clockwise rotation by theta
        Point2 {
            x: d_lon_m * self.cos_rot - d_lat_m * self.sin_rot,
            y: d_lon_m * self.sin_rot + d_lat_m * self.cos_rot,
        }
    }

    pub fn to_gps(&self, p: Point2) -> GeoPoint {
        let d_lon_m = p.x * self.cos_rot + p.y * self.sin_rot;
        let d_lat_m = -p.x * self.sin_rot + p.y * self.cos_rot;
        GeoPoint {
            latitude: self.reference.latitude + d_lat_m / self.m_per_mdeg_lat / 1000.0,
            longitude: self.reference.longitude + d_lon_m / self.m_per_mdeg_lon / 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_frame() -> GeoFrame {
        GeoFrame::new(GeoPoint { latitude: 44.60878672, longitude: 10.91568733 }, 16.0)
    }

    #[test]
    fn test_reference_maps_to_origin() {
        let frame = create_test_frame();
        let p = frame.to_local(frame.reference());
        assert!(p.x.abs() < 1e-12 && p.y.abs() < 1e-12);
    }

    #[test]
    fn test_latitude_scale() {
        let (lat, lon) = meters_per_millidegree(0.0);
        assert!((lat - 111.319_490_79).abs() < 1e-6);
        assert!((lat - lon).abs() < 1e-9);

        let (_, lon_45) = meters_per_millidegree(45.0);
        assert!((lon_45 - lat * std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn test_unrotated_axes() {
        let frame = GeoFrame::new(GeoPoint { latitude: 0.0, longitude: 0.0 }, 0.0);
        // one millidegree east is ~111 m along +x
        let p = frame.to_local(GeoPoint { latitude: 0.0, longitude: 0.001 });
        assert!((p.x - 111.319_490_79).abs() < 1e-6);
        assert!(p.y.abs() < 1e-9);
    }

    #[test]
    fn test_local_to_gps_inverse() {
        let frame = create_test_frame();
        let fix = GeoPoint { latitude: 44.60900, longitude: 10.91600 };
        let local = frame.to_local(fix);
        let back = frame.to_gps(local);
        assert!((back.latitude - fix.latitude).abs() < 1e-10);
        assert!((back.longitude - fix.longitude).abs() < 1e-10);
    }
}
