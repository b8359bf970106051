use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReissueRequest {
    pub refresh: String,
}

/// Envelope the auth endpoints wrap their token pair in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub data: TokenPair,
}
