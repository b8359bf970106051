use async_trait::async_trait;
use run_tracker_lib::run_record::RunRecord;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("run was rejected with status {0}")]
    Rejected(u16),
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl SinkError {
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        SinkError::Other(err.into())
    }
}

/// Where finished runs go.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save(&self, record: &RunRecord) -> Result<(), SinkError>;
}
