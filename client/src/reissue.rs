use async_trait::async_trait;
use run_tracker_lib::auth::{ReissueRequest, TokenPair, TokenResponse};

use crate::{config::ClientConfig, error::ReissueError};

/// Mints a new token pair from a refresh token.
#[async_trait]
pub trait ReissueEndpoint: Send + Sync {
    async fn reissue(&self, request: &ReissueRequest) -> Result<TokenPair, ReissueError>;
}

pub struct HttpReissueEndpoint {
    http: reqwest::Client,
    url: String,
}

impl HttpReissueEndpoint {
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            url: config.url(&config.reissue_path),
        }
    }
}

#[async_trait]
impl ReissueEndpoint for HttpReissueEndpoint {
    async fn reissue(&self, request: &ReissueRequest) -> Result<TokenPair, ReissueError> {
        let response = self.http.post(&self.url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReissueError::Rejected(status));
        }

        let TokenResponse { data } = response.json().await?;
        Ok(data)
    }
}
