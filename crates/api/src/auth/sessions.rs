//! Cookie-backed server-side sessions for the web storefront
//!
//! A request carries at most one `session` cookie holding an opaque id. The
//! session payload lives in a [`SessionBackend`] (Redis in production,
//! process memory otherwise) and is exposed to handlers through the
//! per-request [`Session`] handle inserted by `session_layer`.
//!
//! Session payloads are typed: every value is a [`SessionValue`] variant and
//! its key is implied by the variant, so reads never need a runtime cast.

use async_trait::async_trait;
use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storefront_shared::UserId;
use tokio::sync::{Mutex, RwLock};

pub const SESSION_COOKIE: &str = "session";

const REDIS_KEY_PREFIX: &str = "session:";

// =============================================================================
// Typed session payload
// =============================================================================

/// Keys a session may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKey {
    UserId,
    Flash,
}

/// Values a session may hold; each variant lives under exactly one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SessionValue {
    UserId(UserId),
    Flash(String),
}

impl SessionValue {
    pub fn key(&self) -> SessionKey {
        match self {
            SessionValue::UserId(_) => SessionKey::UserId,
            SessionValue::Flash(_) => SessionKey::Flash,
        }
    }
}

/// Persisted form of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    values: HashMap<SessionKey, SessionValue>,
}

impl SessionRecord {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// Backends
// =============================================================================

/// Storage for session records keyed by session id
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError>;
    async fn save(&self, id: &str, record: &SessionRecord, ttl: Duration) -> Result<(), SessionError>;
    async fn delete(&self, id: &str) -> Result<(), SessionError>;
}

/// Sessions held in process memory
#[derive(Default)]
pub struct MemorySessionBackend {
    records: RwLock<HashMap<String, (SessionRecord, Instant)>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBackend for MemorySessionBackend {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let records = self.records.read().await;
        Ok(records
            .get(id)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(record, _)| record.clone()))
    }

    async fn save(&self, id: &str, record: &SessionRecord, ttl: Duration) -> Result<(), SessionError> {
        let mut records = self.records.write().await;
        // Opportunistic sweep so abandoned sessions don't accumulate
        let now = Instant::now();
        records.retain(|_, (_, expires_at)| *expires_at > now);
        records.insert(id.to_string(), (record.clone(), now + ttl));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.records.write().await.remove(id);
        Ok(())
    }
}

/// Sessions stored in Redis with a per-key TTL
#[derive(Clone)]
pub struct RedisSessionBackend {
    conn: ConnectionManager,
}

impl RedisSessionBackend {
    pub async fn connect(redis_url: &str) -> Result<Self, SessionError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis session backend");
        Ok(Self { conn })
    }

    fn key(id: &str) -> String {
        format!("{REDIS_KEY_PREFIX}{id}")
    }
}

#[async_trait]
impl SessionBackend for RedisSessionBackend {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, id: &str, record: &SessionRecord, ttl: Duration) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;
        let _: () = conn.set_ex(Self::key(id), json, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(id)).await?;
        Ok(())
    }
}

// =============================================================================
// Per-request handle
// =============================================================================

#[derive(Debug)]
struct SessionState {
    id: String,
    /// Id the client presented, if it named a live session
    original_id: Option<String>,
    record: SessionRecord,
    dirty: bool,
    destroyed: bool,
}

/// Handle to the current request's session.
///
/// Cheap to clone; every clone refers to the same state, which
/// `SessionManager::commit` writes back once the handler has run.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    fn new(id: String, original_id: Option<String>, record: SessionRecord) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                id,
                original_id,
                record,
                dirty: false,
                destroyed: false,
            })),
        }
    }

    pub async fn id(&self) -> String {
        self.state.lock().await.id.clone()
    }

    pub async fn exists(&self, key: SessionKey) -> bool {
        self.state.lock().await.record.values.contains_key(&key)
    }

    pub async fn get(&self, key: SessionKey) -> Option<SessionValue> {
        self.state.lock().await.record.values.get(&key).cloned()
    }

    pub async fn user_id(&self) -> Option<UserId> {
        match self.get(SessionKey::UserId).await {
            Some(SessionValue::UserId(id)) => Some(id),
            _ => None,
        }
    }

    pub async fn put(&self, value: SessionValue) {
        let mut state = self.state.lock().await;
        state.record.values.insert(value.key(), value);
        state.dirty = true;
    }

    pub async fn remove(&self, key: SessionKey) {
        let mut state = self.state.lock().await;
        if state.record.values.remove(&key).is_some() {
            state.dirty = true;
        }
    }

    /// Move the session data to a fresh id; the old id stops resolving once
    /// the response is committed.
    pub async fn renew_token(&self) {
        let mut state = self.state.lock().await;
        state.id = generate_session_id();
        state.dirty = true;
    }

    /// Drop all session data and the backing record
    pub async fn destroy(&self) {
        let mut state = self.state.lock().await;
        state.record = SessionRecord::default();
        state.destroyed = true;
        state.dirty = true;
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Loads sessions for incoming requests and commits them afterwards
#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    ttl: Duration,
    timeout: Duration,
    cookie_secure: bool,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn SessionBackend>, ttl: Duration, timeout: Duration, cookie_secure: bool) -> Self {
        Self {
            backend,
            ttl,
            timeout,
            cookie_secure,
        }
    }

    /// Resolve the session named by the request's cookie, or start a new one.
    ///
    /// Unknown ids are never adopted: a client cannot choose its own session id.
    pub async fn load(&self, headers: &HeaderMap) -> Result<Session, SessionError> {
        if let Some(id) = session_cookie(headers) {
            if let Some(record) = self.bounded(self.backend.load(&id)).await? {
                return Ok(Session::new(id.clone(), Some(id), record));
            }
        }
        Ok(Session::new(generate_session_id(), None, SessionRecord::default()))
    }

    /// Persist changes and return the `Set-Cookie` value if the client must
    /// learn a new id.
    pub async fn commit(&self, session: &Session) -> Result<Option<HeaderValue>, SessionError> {
        let state = session.state.lock().await;

        if let Some(original) = &state.original_id {
            if state.destroyed || *original != state.id {
                self.bounded(self.backend.delete(original)).await?;
            }
        }

        let still_original = state.original_id.as_deref() == Some(state.id.as_str());
        if state.dirty {
            if !state.record.is_empty() {
                self.bounded(self.backend.save(&state.id, &state.record, self.ttl))
                    .await?;
            } else if still_original && !state.destroyed {
                self.bounded(self.backend.delete(&state.id)).await?;
            }
        }

        if still_original {
            return Ok(None);
        }

        let cookie = self.cookie_for(&state.id);
        HeaderValue::from_str(&cookie)
            .map(Some)
            .map_err(|_| SessionError::Backend("session id is not a valid header value".to_string()))
    }

    fn cookie_for(&self, id: &str) -> String {
        let secure = if self.cookie_secure { "; Secure" } else { "" };
        format!(
            "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{secure}",
            self.ttl.as_secs()
        )
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, SessionError>
    where
        F: std::future::Future<Output = Result<T, SessionError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| SessionError::Timeout(self.timeout))?
    }
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Extract the session id from the request's `Cookie` headers
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Session backend error: {0}")]
    Backend(String),
}
