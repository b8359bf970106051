use chrono::{DateTime, Utc};
use run_tracker_lib::{coordinate::Coordinate, run_record::RunRecord, util::{average_speed, format_elapsed, path_distance}};

use crate::TrackerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    NotStarted,
    Running,
    PendingSave,
    Saved,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    RealTracking,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Idle,
    ActiveReal,
    ActiveSimulated,
}

impl From<TrackingMode> for SessionMode {
    fn from(mode: TrackingMode) -> Self {
        match mode {
            TrackingMode::RealTracking => SessionMode::ActiveReal,
            TrackingMode::Simulated => SessionMode::ActiveSimulated,
        }
    }
}

/// One run, from the first fix until it is saved or thrown away.
///
/// Fields only change through the transition methods below. Samples are
/// append-only while running and the total distance is always recomputed
/// from them.
#[derive(Debug, Clone)]
pub struct Session {
    samples: Vec<Coordinate>,
    elapsed_seconds: u64,
    total_distance_meters: f64,
    mode: SessionMode,
    status: SessionStatus,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            elapsed_seconds: 0,
            total_distance_meters: 0.,
            mode: SessionMode::Idle,
            status: SessionStatus::NotStarted,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn samples(&self) -> &[Coordinate] {
        &self.samples
    }

    pub fn last_sample(&self) -> Option<Coordinate> {
        self.samples.last().copied()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn total_distance_meters(&self) -> f64 {
        self.total_distance_meters
    }

    pub fn average_speed_mps(&self) -> f64 {
        average_speed(self.total_distance_meters, self.elapsed_seconds)
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// NotStarted -> Running, seeded with the first fix.
    pub fn begin(&mut self, mode: TrackingMode, first: Coordinate) -> Result<(), TrackerError> {
        match self.status {
            SessionStatus::NotStarted => {},
            SessionStatus::Running => return Err(TrackerError::AlreadyRunning),
            from => return Err(TrackerError::InvalidTransition { from, op: "start" }),
        }

        self.samples.clear();
        self.samples.push(first);
        self.elapsed_seconds = 0;
        self.total_distance_meters = 0.;
        self.mode = mode.into();
        self.status = SessionStatus::Running;
        Ok(())
    }

    /// Appends a fix. Returns false if the session is not running or the fix
    /// is identical to the previous one.
    pub fn record_sample(&mut self, coordinate: Coordinate) -> bool {
        if !self.is_running() || self.last_sample() == Some(coordinate) {
            return false;
        }

        self.samples.push(coordinate);
        self.total_distance_meters = path_distance(&self.samples);
        true
    }

    /// Counts one elapsed second. Returns false if the session is not running.
    pub fn tick(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }

        self.elapsed_seconds += 1;
        true
    }

    /// Running -> PendingSave. Measurements freeze, data is kept.
    pub fn stop(&mut self) -> Result<(), TrackerError> {
        self.expect_status(SessionStatus::Running, "stop")?;
        self.status = SessionStatus::PendingSave;
        Ok(())
    }

    /// Builds the payload for the persistence sink without changing state.
    pub fn to_record(&self, title: String, timestamp: DateTime<Utc>) -> Result<RunRecord, TrackerError> {
        self.expect_status(SessionStatus::PendingSave, "save")?;
        Ok(RunRecord::new(
            title,
            self.total_distance_meters,
            self.elapsed_seconds,
            self.average_speed_mps(),
            self.samples.clone(),
            timestamp,
        ))
    }

    /// PendingSave -> Saved.
    pub fn mark_saved(&mut self) -> Result<(), TrackerError> {
        self.expect_status(SessionStatus::PendingSave, "mark as saved")?;
        self.status = SessionStatus::Saved;
        Ok(())
    }

    /// PendingSave -> Discarded.
    pub fn discard(&mut self) -> Result<(), TrackerError> {
        self.expect_status(SessionStatus::PendingSave, "discard")?;
        self.status = SessionStatus::Discarded;
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            mode: self.mode,
            samples: self.samples.clone(),
            elapsed_seconds: self.elapsed_seconds,
            total_distance_meters: self.total_distance_meters,
            average_speed_mps: self.average_speed_mps(),
        }
    }

    fn expect_status(&self, expected: SessionStatus, op: &'static str) -> Result<(), TrackerError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(TrackerError::InvalidTransition { from: self.status, op })
        }
    }
}

/// Read-only copy of a session for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub samples: Vec<Coordinate>,
    pub elapsed_seconds: u64,
    pub total_distance_meters: f64,
    pub average_speed_mps: f64,
}

impl SessionSnapshot {
    pub fn elapsed(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }

    pub fn distance_km(&self) -> f64 {
        self.total_distance_meters / 1000.
    }
}
