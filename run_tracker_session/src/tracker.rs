use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use run_tracker_lib::{coordinate::Coordinate, run_record::RunRecord};
use tokio::{sync::broadcast, time::{self, Instant}};

use crate::{
    activity::ActivityHandle,
    config::TrackerConfig,
    location::{LocationError, LocationSource, LocationUpdate, Permission},
    session::{Session, SessionSnapshot, SessionStatus, TrackingMode},
    sink::PersistenceSink,
    TrackerError,
};

struct TrackerState {
    session: Session,
    // Bumped whenever the running activities are replaced or cancelled, so a
    // callback that was already past its cancellation point can tell it is stale.
    run: u64,
    starting: bool,
    saving: bool,
    activities: Vec<ActivityHandle>,
}

struct Shared {
    state: Mutex<TrackerState>,
    events: broadcast::Sender<LocationUpdate>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock()
    }

    fn record_sample(&self, run: u64, coordinate: Coordinate) {
        let accepted = {
            let mut state = self.lock();
            if state.run != run {
                return;
            }
            state.session.record_sample(coordinate)
        };

        if accepted {
            tracing::debug!("Recorded sample {:?}", coordinate);
            // No subscribers is fine.
            let _ = self.events.send(LocationUpdate::new(coordinate));
        }
    }

    fn tick(&self, run: u64) -> bool {
        let mut state = self.lock();
        state.run == run && state.session.tick()
    }
}

/// Drives one running session at a time: owns the timer and location
/// activities and exposes the start/stop/save/discard lifecycle.
///
/// Dropping the tracker cancels any activity that is still running.
pub struct SessionTracker {
    shared: Arc<Shared>,
    location: Arc<dyn LocationSource>,
    sink: Arc<dyn PersistenceSink>,
    config: TrackerConfig,
}

impl SessionTracker {
    pub fn new(location: Arc<dyn LocationSource>, sink: Arc<dyn PersistenceSink>, config: TrackerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let shared = Arc::new(Shared {
            state: Mutex::new(TrackerState {
                session: Session::new(),
                run: 0,
                starting: false,
                saving: false,
                activities: Vec::new(),
            }),
            events,
        });

        Self {
            shared,
            location,
            sink,
            config,
        }
    }

    /// Map-follow events, one per accepted sample.
    pub fn subscribe_locations(&self) -> broadcast::Receiver<LocationUpdate> {
        self.shared.events.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.lock().session.status()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().session.snapshot()
    }

    /// Fails with `StartCancelled` if the tracker is torn down while the first
    /// fix is still being acquired.
    pub async fn start(&self, mode: TrackingMode) -> Result<(), TrackerError> {
        let run = {
            let mut state = self.shared.lock();
            match state.session.status() {
                SessionStatus::NotStarted if !state.starting => {},
                SessionStatus::NotStarted | SessionStatus::Running => return Err(TrackerError::AlreadyRunning),
                from => return Err(TrackerError::InvalidTransition { from, op: "start" }),
            }
            state.starting = true;
            state.run
        };
        let _starting = StartingGuard(&self.shared);

        let first = match mode {
            TrackingMode::RealTracking => self.first_fix().await?,
            TrackingMode::Simulated => *self.config.simulated_route.first()
                .ok_or_else(|| LocationError::Acquisition("simulated route is empty".into()))?,
        };

        {
            let mut state = self.shared.lock();
            if state.run != run {
                tracing::info!("Start abandoned, the tracker was torn down");
                return Err(TrackerError::StartCancelled);
            }
            state.session.begin(mode, first)?;
            state.run += 1;
            let run = state.run;
            state.activities = vec![self.spawn_timer(run), self.spawn_sampler(mode, run)];
        }

        let _ = self.shared.events.send(LocationUpdate::new(first));
        tracing::info!("Session started in {:?} mode at {:?}", mode, first);
        Ok(())
    }

    /// Freezes the session. Neither the timer nor the sampler records anything
    /// once this returns.
    pub fn stop(&self) -> Result<SessionSnapshot, TrackerError> {
        let (snapshot, activities) = {
            let mut state = self.shared.lock();
            state.session.stop()?;
            state.run += 1;
            (state.session.snapshot(), std::mem::take(&mut state.activities))
        };
        drop(activities);

        tracing::info!(
            "Session stopped after {}s, {:.1}m over {} samples",
            snapshot.elapsed_seconds,
            snapshot.total_distance_meters,
            snapshot.samples.len()
        );
        Ok(snapshot)
    }

    /// Hands the stopped run to the persistence sink. On failure the run stays
    /// pending so the caller can retry or discard it.
    pub async fn save(&self, title: impl Into<String>) -> Result<RunRecord, TrackerError> {
        let record = {
            let mut state = self.shared.lock();
            if state.saving {
                return Err(TrackerError::SaveInProgress);
            }
            let record = state.session.to_record(title.into(), Utc::now())?;
            state.saving = true;
            record
        };
        let _saving = SavingGuard(&self.shared);

        if let Err(err) = self.sink.save(&record).await {
            tracing::error!("Failed to save run {:?}: {err}", record.title);
            return Err(TrackerError::SaveFailed(err));
        }

        let mut state = self.shared.lock();
        // A teardown while the request was in flight already reset the session.
        if state.session.status() == SessionStatus::PendingSave {
            state.session.mark_saved()?;
            state.session = Session::new();
        }
        tracing::info!("Saved run {:?}", record.title);
        Ok(record)
    }

    pub fn discard(&self) -> Result<(), TrackerError> {
        let mut state = self.shared.lock();
        if state.saving {
            return Err(TrackerError::SaveInProgress);
        }
        state.session.discard()?;
        state.session = Session::new();
        tracing::info!("Discarded run");
        Ok(())
    }

    /// Returns to a fresh, not started session whatever the current state.
    /// Safe to call any number of times.
    pub fn teardown(&self) {
        let activities = {
            let mut state = self.shared.lock();
            if state.session.status() != SessionStatus::NotStarted {
                tracing::info!("Tearing down {:?} session", state.session.status());
            }
            state.run += 1;
            state.session = Session::new();
            std::mem::take(&mut state.activities)
        };
        drop(activities);
    }

    async fn first_fix(&self) -> Result<Coordinate, LocationError> {
        if self.location.request_permission().await == Permission::Denied {
            tracing::warn!("Location permission denied");
            return Err(LocationError::PermissionDenied);
        }

        self.location.current_coordinate().await.inspect_err(|err| {
            tracing::warn!("Could not get initial position: {err}");
        })
    }

    fn spawn_timer(&self, run: u64) -> ActivityHandle {
        let shared = Arc::downgrade(&self.shared);
        let period = self.config.tick_interval;

        ActivityHandle::spawn("timer", async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                if !shared.tick(run) {
                    break;
                }
            }
        })
    }

    fn spawn_sampler(&self, mode: TrackingMode, run: u64) -> ActivityHandle {
        let shared = Arc::downgrade(&self.shared);

        match mode {
            TrackingMode::RealTracking => self.location.clone().subscribe(
                self.config.poll_interval,
                Box::new(move |coordinate| on_sample(&shared, run, coordinate)),
            ),
            TrackingMode::Simulated => {
                let route = self.config.simulated_route.clone();
                let period = self.config.simulation_interval;

                ActivityHandle::spawn("simulation", async move {
                    let mut interval = time::interval_at(Instant::now() + period, period);
                    for coordinate in route.into_iter().skip(1) {
                        interval.tick().await;
                        on_sample(&shared, run, coordinate);
                    }
                    tracing::debug!("Simulated route finished");
                })
            },
        }
    }
}

fn on_sample(shared: &Weak<Shared>, run: u64, coordinate: Coordinate) {
    if let Some(shared) = shared.upgrade() {
        shared.record_sample(run, coordinate);
    }
}

struct StartingGuard<'a>(&'a Shared);

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().starting = false;
    }
}

struct SavingGuard<'a>(&'a Shared);

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().saving = false;
    }
}
