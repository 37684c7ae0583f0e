//! Durable token storage.
//!
//! The live token sits in process memory; a [`TokenStore`] persists it so a
//! session survives restarts. Persistence is best effort: by the time a
//! store runs, the in-memory session is already updated, so a failed write
//! only logs a warning. Consumers that want login-state changes should
//! watch [`SessionManager::subscribe`](crate::SessionManager::subscribe)
//! rather than polling a store.

use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

/// Persists the access token between runs.
#[async_trait]
pub trait TokenStore: Debug + Send + Sync {
    /// Read the persisted token, if any.
    async fn load(&self) -> Option<String>;

    /// Persist a freshly issued token.
    async fn save(&self, token: &str);

    /// Drop any persisted token.
    async fn clear(&self);
}

/// In-process store; state dies with the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn save(&self, token: &str) {
        *self.token.write().await = Some(token.to_owned());
    }

    async fn clear(&self) {
        *self.token.write().await = None;
    }
}

/// The persisted document: `{"token": "…"}` under the well-known key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    token: String,
}

/// JSON file store at a caller-chosen path.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store the token document at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Option<String> {
        let bytes = tokio::fs::read(&self.path).await.ok()?;
        match serde_json::from_slice::<StoredToken>(&bytes) {
            Ok(document) => Some(document.token),
            Err(error) => {
                warn!(%error, path = %self.path.display(), "ignoring unreadable token file");
                None
            }
        }
    }

    async fn save(&self, token: &str) {
        let document = StoredToken {
            token: token.to_owned(),
        };
        let bytes = match serde_json::to_vec(&document) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "failed to encode token document");
                return;
            }
        };
        if let Err(error) = tokio::fs::write(&self.path, bytes).await {
            warn!(%error, path = %self.path.display(), "failed to persist token");
        }
    }

    async fn clear(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(%error, path = %self.path.display(), "failed to clear persisted token");
            }
        }
    }
}
