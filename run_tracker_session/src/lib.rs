use location::LocationError;
use session::SessionStatus;
use sink::SinkError;

mod activity;
pub mod config;
pub mod location;
pub mod route;
pub mod session;
pub mod sink;
mod tracker;

pub use activity::ActivityHandle;
pub use config::TrackerConfig;
pub use tracker::*;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("location unavailable: {0}")]
    LocationUnavailable(#[from] LocationError),
    #[error("failed to save run: {0}")]
    SaveFailed(#[source] SinkError),
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("start was cancelled by a teardown")]
    StartCancelled,
    #[error("the run is already being saved")]
    SaveInProgress,
    #[error("cannot {op} a session that is {from:?}")]
    InvalidTransition {
        from: SessionStatus,
        op: &'static str,
    },
}
