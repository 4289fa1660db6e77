//! geo.rs — WGS-84 helpers shared by the supervisor and the simulator
//!
//! Distances use the haversine great-circle formula on a sphere of the
//! IUGG mean Earth radius. Local offsets are applied as a flat-earth
//! displacement, which is accurate to centimetres over a few kilometres.

use serde::{Deserialize, Serialize};

/// IUGG mean Earth radius, metres
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// A geodetic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wgs84Point {
    pub lat: f64,
    pub lon: f64,
}

impl Wgs84Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Latitude within ±90° and longitude within ±180°.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    pub fn distance_to(&self, other: &Wgs84Point) -> f64 {
        distance_m(*self, *other)
    }
}

/// Great-circle distance between two points, metres.
pub fn distance_m(a: Wgs84Point, b: Wgs84Point) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` to `b`, radians clockwise from north.
pub fn bearing_rad(a: Wgs84Point, b: Wgs84Point) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlon = (b.lon - a.lon).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x)
}

/// Move `origin` by `north_m` / `east_m` metres.
pub fn displace(origin: Wgs84Point, north_m: f64, east_m: f64) -> Wgs84Point {
    let lat = origin.lat + (north_m / EARTH_MEAN_RADIUS_M).to_degrees();
    let cos_lat = origin.lat.to_radians().cos().max(1e-9);
    let lon = origin.lon + (east_m / (EARTH_MEAN_RADIUS_M * cos_lat)).to_degrees();
    Wgs84Point { lat, lon }
}
