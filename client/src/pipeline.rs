use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use reqwest::{Method, Response, StatusCode};
use run_tracker_lib::auth::{ReissueRequest, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};

use crate::{config::ClientConfig, error::PipelineError, reissue::ReissueEndpoint, token_store::TokenStore};

/// Something the user has to be told about, usually followed by sending them
/// back to sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignInRequired,
    SessionExpired,
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthEvent::SignInRequired => write!(f, "You need to sign in first."),
            AuthEvent::SessionExpired => write!(f, "Your session has expired. You have been logged out."),
        }
    }
}

/// A request relative to the server root. Kept as plain data so it can be
/// sent again after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: &impl Serialize) -> Result<Self, serde_json::Error> {
        Self::new(Method::POST, path).json(body)
    }

    pub fn json(mut self, body: &impl Serialize) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

struct Waiter {
    id: u64,
    // None means the refresh failed.
    release: oneshot::Sender<Option<String>>,
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    // Counts finished refreshes. A request remembers the value it saw before
    // reading its token, so a 401 for a token that has since been replaced
    // is recognised as stale.
    generation: u64,
    next_waiter: u64,
    waiters: VecDeque<Waiter>,
}

struct Inner {
    http: reqwest::Client,
    server_url: String,
    refresh_timeout: Duration,
    tokens: Arc<dyn TokenStore>,
    reissuer: Arc<dyn ReissueEndpoint>,
    state: Mutex<RefreshState>,
    events: broadcast::Sender<AuthEvent>,
}

enum Recovery {
    Replay,
    Wait(oneshot::Receiver<Option<String>>, u64),
    Lead(String),
}

/// Sends requests with the stored bearer token and recovers from an expired
/// access token with a single shared refresh.
///
/// Cloning is cheap and clones share the refresh state. Separate instances
/// created with [`AuthPipeline::new`] are fully independent.
#[derive(Clone)]
pub struct AuthPipeline {
    inner: Arc<Inner>,
}

impl AuthPipeline {
    pub fn new(http: reqwest::Client, config: &ClientConfig, tokens: Arc<dyn TokenStore>, reissuer: Arc<dyn ReissueEndpoint>) -> Self {
        let (events, _) = broadcast::channel(16);

        Self {
            inner: Arc::new(Inner {
                http,
                server_url: config.server_url.trim_end_matches('/').to_string(),
                refresh_timeout: config.refresh_timeout,
                tokens,
                reissuer,
                state: Mutex::new(RefreshState::default()),
                events,
            }),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.tokens
    }

    /// Number of requests currently waiting for a refresh to finish.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Sends `request` with `Authorization: Bearer <access>`.
    ///
    /// Any response other than a recoverable 401 is returned untouched,
    /// including error statuses.
    pub async fn send(&self, request: ApiRequest) -> Result<Response, PipelineError> {
        let generation = self.inner.state.lock().generation;
        let Some(access) = self.inner.tokens.get(ACCESS_TOKEN_KEY).await else {
            tracing::warn!("No access token for {} {}, sign-in required", request.method, request.path);
            let _ = self.inner.events.send(AuthEvent::SignInRequired);
            return Err(PipelineError::Unauthenticated);
        };

        let response = self.inner.dispatch(&request, &access).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // A refresh finished while this request was out: its token was
        // already replaced, or cleared if that refresh failed.
        let stale = self.inner.state.lock().generation != generation;
        let access = if stale {
            self.inner.current_access().await?
        } else {
            let Some(refresh) = self.inner.tokens.get(REFRESH_TOKEN_KEY).await else {
                return Ok(response);
            };
            tracing::debug!("{} {} was unauthorized, recovering", request.method, request.path);
            self.inner.clone().recover(generation, refresh).await?
        };
        Ok(self.inner.dispatch(&request, &access).await?)
    }
}

impl Inner {
    async fn dispatch(&self, request: &ApiRequest, access: &str) -> reqwest::Result<Response> {
        let url = format!("{}{}", self.server_url, request.path);
        let mut builder = self.http.request(request.method.clone(), url).bearer_auth(access);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder.send().await
    }

    async fn current_access(&self) -> Result<String, PipelineError> {
        self.tokens.get(ACCESS_TOKEN_KEY).await.ok_or(PipelineError::SessionExpired)
    }

    /// Gets a usable access token after a 401 by replaying with a token that
    /// already replaced the one we sent, waiting for the refresh in flight,
    /// or starting the refresh ourselves.
    async fn recover(self: Arc<Self>, generation: u64, refresh: String) -> Result<String, PipelineError> {
        let recovery = {
            let mut state = self.state.lock();
            if state.generation != generation {
                Recovery::Replay
            } else if state.refreshing {
                let (release, wait) = oneshot::channel();
                let id = state.next_waiter;
                state.next_waiter += 1;
                state.waiters.push_back(Waiter { id, release });
                Recovery::Wait(wait, id)
            } else {
                state.refreshing = true;
                Recovery::Lead(refresh)
            }
        };

        match recovery {
            Recovery::Replay => self.current_access().await,
            Recovery::Wait(wait, id) => {
                let _queued = QueuedGuard { inner: &self, id };
                match tokio::time::timeout(self.refresh_timeout, wait).await {
                    Ok(Ok(Some(access))) => Ok(access),
                    Ok(_) => Err(PipelineError::SessionExpired),
                    Err(_) => {
                        tracing::warn!("Gave up waiting for token refresh after {:?}", self.refresh_timeout);
                        Err(PipelineError::RefreshTimeout)
                    },
                }
            },
            // The refresh runs on its own task so the queue is always drained,
            // even if the request that started it is abandoned.
            Recovery::Lead(refresh) => match tokio::spawn(self.clone().refresh(refresh)).await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!("Token refresh task failed: {err}");
                    Err(PipelineError::SessionExpired)
                },
            },
        }
    }

    async fn refresh(self: Arc<Self>, refresh: String) -> Result<String, PipelineError> {
        match self.reissuer.reissue(&ReissueRequest { refresh }).await {
            Ok(pair) => {
                self.tokens.set(ACCESS_TOKEN_KEY, &pair.access).await;
                if !pair.refresh.is_empty() {
                    self.tokens.set(REFRESH_TOKEN_KEY, &pair.refresh).await;
                }

                let waiters = self.finish_refresh();
                tracing::info!("Access token refreshed, releasing {} queued requests", waiters.len());
                for waiter in waiters {
                    let _ = waiter.release.send(Some(pair.access.clone()));
                }
                Ok(pair.access)
            },
            Err(err) => {
                tracing::error!("Token reissue failed, clearing session: {err}");
                self.tokens.clear().await;

                let waiters = self.finish_refresh();
                for waiter in waiters {
                    let _ = waiter.release.send(None);
                }
                let _ = self.events.send(AuthEvent::SessionExpired);
                Err(PipelineError::SessionExpired)
            },
        }
    }

    fn finish_refresh(&self) -> VecDeque<Waiter> {
        let mut state = self.state.lock();
        state.refreshing = false;
        state.generation += 1;
        std::mem::take(&mut state.waiters)
    }
}

/// Removes a waiter from the queue when its request gives up, times out or
/// is dropped. Waiters already released are gone from the queue.
struct QueuedGuard<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.inner.state.lock().waiters.retain(|waiter| waiter.id != self.id);
    }
}
