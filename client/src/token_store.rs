use std::{collections::HashMap, path::{Path, PathBuf}};

use async_trait::async_trait;
use parking_lot::Mutex;
use run_tracker_lib::auth::{TokenPair, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

/// Key-value storage for the access/refresh token pair.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: &str);

    /// Forgets both tokens.
    async fn clear(&self);

    async fn store_pair(&self, pair: &TokenPair) {
        self.set(ACCESS_TOKEN_KEY, &pair.access).await;
        self.set(REFRESH_TOKEN_KEY, &pair.refresh).await;
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: &TokenPair) -> Self {
        let tokens = HashMap::from([
            (ACCESS_TOKEN_KEY.to_string(), pair.access.clone()),
            (REFRESH_TOKEN_KEY.to_string(), pair.refresh.clone()),
        ]);
        Self {
            tokens: Mutex::new(tokens),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.tokens.lock().get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) {
        self.tokens.lock().insert(key.to_string(), value.to_string());
    }

    async fn clear(&self) {
        let mut tokens = self.tokens.lock();
        tokens.remove(ACCESS_TOKEN_KEY);
        tokens.remove(REFRESH_TOKEN_KEY);
    }
}

/// Tokens kept in a JSON file so they survive restarts of the CLI.
///
/// The in-memory map is authoritative; every change is written through to
/// disk and a failed write is logged rather than surfaced.
pub struct FileTokenStore {
    path: PathBuf,
    tokens: tokio::sync::Mutex<HashMap<String, String>>,
}

impl FileTokenStore {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let tokens = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                tracing::warn!("Ignoring unreadable token file {:?}: {err}", path);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            tokens: tokio::sync::Mutex::new(tokens),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, tokens: &HashMap<String, String>) {
        if let Some(dir) = self.path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(dir).await {
                tracing::error!("Failed to create token directory {:?}: {err}", dir);
                return;
            }
        }

        let result = match serde_json::to_vec_pretty(tokens) {
            Ok(bytes) => tokio::fs::write(&self.path, bytes).await,
            Err(err) => Err(err.into()),
        };

        if let Err(err) = result {
            tracing::error!("Failed to write token file {:?}: {err}", self.path);
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.tokens.lock().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) {
        let mut tokens = self.tokens.lock().await;
        tokens.insert(key.to_string(), value.to_string());
        self.persist(&tokens).await;
    }

    async fn clear(&self) {
        let mut tokens = self.tokens.lock().await;
        tokens.remove(ACCESS_TOKEN_KEY);
        tokens.remove(REFRESH_TOKEN_KEY);
        self.persist(&tokens).await;
    }
}
