use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("timed out waiting for the access token to be refreshed")]
    RefreshTimeout,
    #[error("session expired, please sign in again")]
    SessionExpired,
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ReissueError {
    #[error("reissue was rejected with status {0}")]
    Rejected(StatusCode),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("sign-in was rejected with status {0}")]
    Rejected(StatusCode),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}
