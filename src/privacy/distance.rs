use crate::model::Coordinates;
use std::f64::consts::PI;

/// Mean Earth radius in kilometres (IUGG).
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Degrees to radians conversion factor.
const DEG_TO_RAD: f64 = PI / 180.0;

/// Great-circle distance between two points in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude * DEG_TO_RAD;
    let lat2 = b.latitude * DEG_TO_RAD;
    let d_lat = (b.latitude - a.latitude) * DEG_TO_RAD;
    let d_lon = (b.longitude - a.longitude) * DEG_TO_RAD;

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Circle around the viewer inside which entities are discoverable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiscoveryArea {
    pub center: Coordinates,
    pub radius_km: f64,
}

impl DiscoveryArea {
    pub fn contains(&self, point: Coordinates) -> bool {
        haversine_km(self.center, point) <= self.radius_km
    }
}
