use std::sync::Arc;

use run_tracker_lib::auth::{SignInRequest, TokenPair, TokenResponse};

use crate::{config::ClientConfig, error::AuthError, token_store::TokenStore};

/// Sign-in and sign-out against the auth endpoints. These calls do not go
/// through the pipeline since they are what produces the tokens.
pub struct AuthRepository {
    http: reqwest::Client,
    sign_in_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl AuthRepository {
    pub fn new(http: reqwest::Client, config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            http,
            sign_in_url: config.url(&config.sign_in_path),
            tokens,
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let request = SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = self.http.post(&self.sign_in_url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Sign-in for {email} rejected with {status}");
            return Err(AuthError::Rejected(status));
        }

        let TokenResponse { data } = response.json().await?;
        self.tokens.store_pair(&data).await;
        tracing::info!("Signed in as {email}");
        Ok(data)
    }

    pub async fn sign_out(&self) {
        self.tokens.clear().await;
        tracing::info!("Signed out");
    }
}
