use std::{path::PathBuf, time::Duration};

use const_format::concatcp;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
pub const SIGN_IN_PATH: &str = "/auth/sign-in";
pub const REISSUE_PATH: &str = "/auth/reissue";
pub const RUNNING_PATH: &str = "/running";

pub const DATA_DIR: &str = "data/";
pub const TOKEN_FILE: &str = concatcp!(DATA_DIR, "tokens.json");

/// How long a request queued behind an in-flight refresh waits for the new token.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub sign_in_path: String,
    pub reissue_path: String,
    pub running_path: String,
    pub refresh_timeout: Duration,
    pub token_file: PathBuf,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let root = project_root::get_project_root().unwrap_or_default();

        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            sign_in_path: SIGN_IN_PATH.into(),
            reissue_path: REISSUE_PATH.into(),
            running_path: RUNNING_PATH.into(),
            refresh_timeout: REFRESH_TIMEOUT,
            token_file: root.join(TOKEN_FILE),
        }
    }
}
