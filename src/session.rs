//! Persisted session (Token Store)
//!
//! The signed-in user is one JSON object stored under a single key
//! (`userData` by default) holding `accessToken`, `refreshToken` and profile
//! fields. Every write goes through [`TokenStore::update`], which holds the
//! store lock across the read and the write.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::config::{ClientConfig, DEFAULT_SESSION_KEY};
use crate::{ClientError, Result};

/// Session blob as persisted by the dashboards
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Profile fields (`id`, `businessId`, `email`, ...) kept verbatim
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            profile: Map::new(),
        }
    }

    /// Set a profile field
    #[must_use]
    pub fn with_profile(mut self, field: impl Into<String>, value: Value) -> Self {
        self.profile.insert(field.into(), value);
        self
    }

    /// Signed-in user id
    pub fn user_id(&self) -> Option<String> {
        self.profile_id("id")
    }

    /// Business the user administers, absent for end users
    pub fn business_id(&self) -> Option<String> {
        self.profile_id("businessId")
    }

    fn profile_id(&self, field: &str) -> Option<String> {
        match self.profile.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Storage the session blob is persisted to
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Raw blob stored under `key`, if any
    async fn load(&self, key: &str) -> Result<Option<String>>;

    async fn save(&self, key: &str, blob: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-process backend, mostly for tests and short-lived tools
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, blob: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), blob.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{key}.{}.tmp", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl SessionBackend for FileBackend {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Storage(e.to_string())),
        }
    }

    /// Writes a temp file next to the target and renames it into place, so a
    /// reader never sees a partially written blob
    async fn save(&self, key: &str, blob: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ClientError::Storage(e.to_string()))?;

        let temp = self.temp_path(key);
        if let Err(e) = tokio::fs::write(&temp, blob).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ClientError::Storage(e.to_string()));
        }
        if let Err(e) = tokio::fs::rename(&temp, self.path(key)).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ClientError::Storage(e.to_string()));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Storage(e.to_string())),
        }
    }
}

/// Token Store over a [`SessionBackend`]
///
/// Cheap to clone; clones share the backend and the write lock.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn SessionBackend>,
    key: Arc<str>,
    lock: Arc<Mutex<()>>,
}

impl TokenStore {
    /// Store under the default `userData` key
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self::with_key(backend, DEFAULT_SESSION_KEY)
    }

    /// Store under the configured `SESSION_KEY`
    pub fn from_config(backend: Arc<dyn SessionBackend>, config: &ClientConfig) -> Self {
        Self::with_key(backend, config.session_key())
    }

    pub fn with_key(backend: Arc<dyn SessionBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: Arc::from(key.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Parse the persisted session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MalformedSession`] when the blob is not a session object.
    pub async fn read(&self) -> Result<Option<Session>> {
        let _guard = self.lock.lock().await;
        self.load_unlocked().await
    }

    /// Current access token; a malformed blob counts as no session
    pub async fn access_token(&self) -> Option<String> {
        self.read_lenient().await.and_then(|s| s.access_token)
    }

    /// Current refresh token; a malformed blob counts as no session
    pub async fn refresh_token(&self) -> Option<String> {
        self.read_lenient().await.and_then(|s| s.refresh_token)
    }

    /// Replace the access token, leaving every other field untouched
    pub async fn set_access_token(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.update(move |session| session.access_token = Some(token))
            .await
            .map(|_| ())
    }

    /// Replace both tokens in a single write
    pub async fn set_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<()> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        self.update(move |session| {
            session.access_token = Some(access_token);
            session.refresh_token = Some(refresh_token);
        })
        .await
        .map(|_| ())
    }

    /// Atomic read-modify-write of the session.
    ///
    /// A missing session starts from [`Session::default`]. Returns the session as written.
    pub async fn update<F>(&self, f: F) -> Result<Session>
    where
        F: FnOnce(&mut Session) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut session = self.load_unlocked().await?.unwrap_or_default();
        f(&mut session);
        self.store_unlocked(&session).await?;
        Ok(session)
    }

    /// Overwrite the whole session (login)
    pub async fn save(&self, session: &Session) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store_unlocked(session).await
    }

    /// Remove the session (logout)
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        tracing::debug!(key = %self.key, "clearing session");
        self.backend.remove(&self.key).await
    }

    async fn read_lenient(&self) -> Option<Session> {
        match self.read().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "ignoring unreadable session");
                None
            }
        }
    }

    async fn load_unlocked(&self) -> Result<Option<Session>> {
        let Some(blob) = self.backend.load(&self.key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&blob)
            .map(Some)
            .map_err(|e| ClientError::MalformedSession(e.to_string()))
    }

    async fn store_unlocked(&self, session: &Session) -> Result<()> {
        let blob = serde_json::to_string(session)?;
        self.backend.save(&self.key, &blob).await
    }
}
