use crate::core::errors::{Result, SearchError};
use crate::core::types::GeoPoint;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const EARTH_RADIUS: f64 = 6371000.0;

// Relative padding applied to every bounding-box delta so rounding can only widen the box.
const BOX_MARGIN: f64 = 1e-9;
const BOX_EPSILON_DEG: f64 = 1e-12;

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lon1_rad = lon1.to_radians();
    let lat2_rad = lat2.to_radians();
    let lon2_rad = lon2.to_radians();

    let dlat = lat2_rad - lat1_rad;
    let dlon = lon2_rad - lon1_rad;

    let a =
        (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());

    EARTH_RADIUS * c
}

/// Great-circle distance in meters.
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    if a == b {
        return 0.0;
    }
    haversine_distance(a.lat(), a.lon(), b.lat(), b.lon())
}

pub fn meters_per_degree_lat() -> f64 {
    EARTH_RADIUS * PI / 180.0
}

pub fn meters_per_degree_lon(lat: f64) -> f64 {
    meters_per_degree_lat() * lat.to_radians().cos()
}

/// Axis-aligned box in degrees. `min_lon > max_lon` marks a box crossing the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBox")]
pub struct BoundingBox {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

#[derive(Deserialize)]
struct RawBox {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl TryFrom<RawBox> for BoundingBox {
    type Error = SearchError;

    fn try_from(raw: RawBox) -> Result<Self> {
        BoundingBox::new(raw.min_lat, raw.max_lat, raw.min_lon, raw.max_lon)
    }
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self> {
        GeoPoint::new(min_lat, min_lon)?;
        GeoPoint::new(max_lat, max_lon)?;
        if min_lat > max_lat {
            return Err(SearchError::InvalidQuery(format!(
                "bounding box min_lat {} exceeds max_lat {}",
                min_lat, max_lat
            )));
        }
        Ok(BoundingBox {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    pub fn world() -> Self {
        BoundingBox {
            min_lat: -90.0,
            max_lat: 90.0,
            min_lon: -180.0,
            max_lon: 180.0,
        }
    }

    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    pub fn wraps(&self) -> bool {
        self.min_lon > self.max_lon
    }

    /// Splits an antimeridian-crossing box into its eastern and western halves.
    pub fn parts(&self) -> Vec<BoundingBox> {
        if !self.wraps() {
            return vec![*self];
        }
        vec![
            BoundingBox {
                max_lon: 180.0,
                ..*self
            },
            BoundingBox {
                min_lon: -180.0,
                ..*self
            },
        ]
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        let lat_ok = point.lat() >= self.min_lat && point.lat() <= self.max_lat;
        let lon_ok = if self.wraps() {
            point.lon() >= self.min_lon || point.lon() <= self.max_lon
        } else {
            point.lon() >= self.min_lon && point.lon() <= self.max_lon
        };
        lat_ok && lon_ok
    }
}

fn pad(delta_deg: f64) -> f64 {
    delta_deg * (1.0 + BOX_MARGIN) + BOX_EPSILON_DEG
}

/// Smallest box (under the local approximation) that is guaranteed to contain the disc.
///
/// Latitudes are clamped to the poles. A disc that reaches a pole spans every longitude,
/// and a disc that crosses ±180° yields a wrapped box (see [`BoundingBox::parts`]).
pub fn bounding_box(center: &GeoPoint, radius_m: f64) -> BoundingBox {
    let radius_m = radius_m.max(0.0);
    let lat = center.lat();
    let lon = center.lon();

    let d_lat = pad(radius_m / meters_per_degree_lat());
    let min_lat = lat - d_lat;
    let max_lat = lat + d_lat;

    if min_lat <= -90.0 || max_lat >= 90.0 {
        return BoundingBox {
            min_lat: min_lat.max(-90.0),
            max_lat: max_lat.min(90.0),
            min_lon: -180.0,
            max_lon: 180.0,
        };
    }

    let angular = radius_m / EARTH_RADIUS;
    let cos_lat = lat.to_radians().cos();
    let ratio = angular.sin() / cos_lat;
    if ratio >= 1.0 {
        return BoundingBox {
            min_lat,
            max_lat,
            min_lon: -180.0,
            max_lon: 180.0,
        };
    }

    let d_lon_exact = ratio.asin().to_degrees();
    let d_lon_local = radius_m / meters_per_degree_lon(lat);
    let d_lon = pad(d_lon_exact.max(d_lon_local));
    if d_lon >= 180.0 {
        return BoundingBox {
            min_lat,
            max_lat,
            min_lon: -180.0,
            max_lon: 180.0,
        };
    }

    let mut min_lon = lon - d_lon;
    let mut max_lon = lon + d_lon;
    if min_lon <= -180.0 {
        min_lon += 360.0;
    } else if max_lon >= 180.0 {
        max_lon -= 360.0;
    }

    BoundingBox {
        min_lat,
        max_lat,
        min_lon,
        max_lon,
    }
}
