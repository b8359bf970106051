use async_trait::async_trait;
use run_tracker_lib::run_record::RunRecord;
use run_tracker_session::sink::{PersistenceSink, SinkError};

use crate::pipeline::{ApiRequest, AuthPipeline};

/// Saves finished runs to the server through the authenticated pipeline.
pub struct HttpPersistenceSink {
    pipeline: AuthPipeline,
    path: String,
}

impl HttpPersistenceSink {
    pub fn new(pipeline: AuthPipeline, path: impl Into<String>) -> Self {
        Self {
            pipeline,
            path: path.into(),
        }
    }
}

#[async_trait]
impl PersistenceSink for HttpPersistenceSink {
    async fn save(&self, record: &RunRecord) -> Result<(), SinkError> {
        let request = ApiRequest::post(self.path.clone(), record).map_err(SinkError::other)?;
        let response = self.pipeline.send(request).await.map_err(SinkError::other)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected(status.as_u16()));
        }

        tracing::debug!("Server accepted run {:?} with {}", record.title, status);
        Ok(())
    }
}
