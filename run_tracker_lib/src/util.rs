use crate::coordinate::Coordinate;

/// Mean radius of the earth in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn haversine_distance(p1: Coordinate, p2: Coordinate) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lon = (p2.longitude - p1.longitude).to_radians();

    let a = f64::sin(d_lat / 2.).powi(2)
        + f64::cos(lat1) * f64::cos(lat2) * f64::sin(d_lon / 2.).powi(2);
    let c = 2. * f64::atan2(a.sqrt(), (1. - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Sum of the segment lengths along `path`, in meters.
pub fn path_distance(path: &[Coordinate]) -> f64 {
    path.windows(2)
        .map(|pair| haversine_distance(pair[0], pair[1]))
        .sum()
}

/// Meters per second, or 0 when no time has passed.
pub fn average_speed(distance_meters: f64, elapsed_seconds: u64) -> f64 {
    if elapsed_seconds == 0 {
        return 0.;
    }

    let speed = distance_meters / elapsed_seconds as f64;
    if speed.is_finite() { speed } else { 0. }
}

/// Formats a duration as `MM:SS`. Minutes keep counting past an hour.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
