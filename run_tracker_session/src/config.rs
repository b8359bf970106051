use std::time::Duration;

use run_tracker_lib::coordinate::Coordinate;

use crate::route::SIMULATED_ROUTE;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const SIMULATION_INTERVAL: Duration = Duration::from_secs(2);
pub const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Period of the elapsed-time counter.
    pub tick_interval: Duration,
    /// How often the location source is asked for a fix while tracking for real.
    pub poll_interval: Duration,
    /// Cadence at which the simulated route is replayed.
    pub simulation_interval: Duration,
    pub simulated_route: Vec<Coordinate>,
    /// Buffer of the location update channel. Slow subscribers skip updates.
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: TICK_INTERVAL,
            poll_interval: POLL_INTERVAL,
            simulation_interval: SIMULATION_INTERVAL,
            simulated_route: SIMULATED_ROUTE.to_vec(),
            event_capacity: EVENT_CAPACITY,
        }
    }
}
