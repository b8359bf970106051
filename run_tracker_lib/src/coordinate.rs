use serde::{Deserialize, Serialize};

use crate::util::haversine_distance;

/// Span in degrees of the map viewport that follows the runner.
pub const VIEWPORT_SPAN: f64 = 0.005;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(*self, *other)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

/// Map viewport centered on a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapRegion {
    pub center: Coordinate,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl MapRegion {
    pub fn around(center: Coordinate) -> Self {
        Self {
            center,
            latitude_delta: VIEWPORT_SPAN,
            longitude_delta: VIEWPORT_SPAN,
        }
    }
}
