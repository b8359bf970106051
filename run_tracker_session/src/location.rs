use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use run_tracker_lib::coordinate::{Coordinate, MapRegion};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::activity::ActivityHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission was denied")]
    PermissionDenied,
    #[error("could not acquire a position fix: {0}")]
    Acquisition(String),
}

/// Emitted for every accepted sample so a map can follow the runner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationUpdate {
    pub coordinate: Coordinate,
    pub region: MapRegion,
}

impl LocationUpdate {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            region: MapRegion::around(coordinate),
        }
    }
}

pub type UpdateCallback = Box<dyn Fn(Coordinate) + Send + Sync + 'static>;

/// Anything that can tell where the device is.
#[async_trait]
pub trait LocationSource: Send + Sync + 'static {
    async fn request_permission(&self) -> Permission;

    async fn current_coordinate(&self) -> Result<Coordinate, LocationError>;

    /// Delivers a fix to `on_update` every `period` until the handle is dropped.
    ///
    /// The default polls `current_coordinate`. Failed fixes are skipped.
    fn subscribe(self: Arc<Self>, period: Duration, on_update: UpdateCallback) -> ActivityHandle {
        ActivityHandle::spawn("location", async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                match self.current_coordinate().await {
                    Ok(coordinate) => on_update(coordinate),
                    Err(err) => tracing::warn!("Skipping location fix: {err}"),
                }
            }
        })
    }
}

/// Plays back a fixed list of fixes, one per request. The last fix repeats
/// once the list runs out, like a device standing still.
pub struct ScriptedLocationSource {
    permission: Permission,
    fixes: Mutex<VecDeque<Result<Coordinate, LocationError>>>,
    last: Mutex<Option<Coordinate>>,
}

impl ScriptedLocationSource {
    pub fn new(fixes: impl IntoIterator<Item = Coordinate>) -> Self {
        Self::with_results(fixes.into_iter().map(Ok))
    }

    pub fn with_results(fixes: impl IntoIterator<Item = Result<Coordinate, LocationError>>) -> Self {
        Self {
            permission: Permission::Granted,
            fixes: Mutex::new(fixes.into_iter().collect()),
            last: Mutex::new(None),
        }
    }

    pub fn denied() -> Self {
        Self {
            permission: Permission::Denied,
            fixes: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LocationSource for ScriptedLocationSource {
    async fn request_permission(&self) -> Permission {
        self.permission
    }

    async fn current_coordinate(&self) -> Result<Coordinate, LocationError> {
        if self.permission == Permission::Denied {
            return Err(LocationError::PermissionDenied);
        }

        let next = self.fixes.lock().pop_front();
        match next {
            Some(Ok(coordinate)) => {
                *self.last.lock() = Some(coordinate);
                Ok(coordinate)
            },
            Some(Err(err)) => Err(err),
            None => (*self.last.lock()).ok_or_else(|| LocationError::Acquisition("no fix available".into())),
        }
    }
}
