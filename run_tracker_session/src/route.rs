use run_tracker_lib::coordinate::Coordinate;

/// Pre-recorded run around Dongdaegu station, replayed in simulated mode.
pub const SIMULATED_ROUTE: [Coordinate; 13] = [
    Coordinate::new(35.8776, 128.6284),
    Coordinate::new(35.8780, 128.6290),
    Coordinate::new(35.8785, 128.6295),
    Coordinate::new(35.8790, 128.6300),
    Coordinate::new(35.8795, 128.6305),
    Coordinate::new(35.8800, 128.6310),
    Coordinate::new(35.8805, 128.6315),
    Coordinate::new(35.8810, 128.6320),
    Coordinate::new(35.8815, 128.6325),
    Coordinate::new(35.8820, 128.6330),
    Coordinate::new(35.8825, 128.6335),
    Coordinate::new(35.8830, 128.6340),
    Coordinate::new(35.8835, 128.6345),
];
