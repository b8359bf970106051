use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::coordinate::Coordinate;

/// A finished run, as handed to the persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub title: String,
    pub distance_meters: f64,
    pub elapsed_seconds: u64,
    pub average_speed_mps: f64,
    pub samples: Vec<Coordinate>,
    pub timestamp: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(title: String, distance_meters: f64, elapsed_seconds: u64, average_speed_mps: f64, samples: Vec<Coordinate>, timestamp: DateTime<Utc>) -> Self {
        Self {
            title,
            distance_meters,
            elapsed_seconds,
            average_speed_mps,
            samples,
            timestamp,
        }
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_meters / 1000.
    }
}
