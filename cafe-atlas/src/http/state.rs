use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use dashmap::DashMap;
use sqlx::SqlitePool;
use tracing::warn;

use crate::auth::TokenIssuer;
use crate::config::AppConfig;
use crate::rate_limit::RateLimits;
use crate::uploads::UploadStore;

/// Session token -> (user id, expires_at).
///
/// Plain logins live for `ttl`; "remember me" logins for `remember_ttl`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<DashMap<String, (i64, Instant)>>,
    ttl: Duration,
    remember_ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration, remember_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
            remember_ttl,
        }
    }

    pub fn ttl(&self, remember: bool) -> Duration {
        if remember {
            self.remember_ttl
        } else {
            self.ttl
        }
    }

    pub fn create(&self, user_id: i64, remember: bool) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let expires = Instant::now() + self.ttl(remember);
        self.inner.insert(token.clone(), (user_id, expires));
        token
    }

    pub fn get(&self, token: &str) -> Option<i64> {
        let entry = self.inner.get(token)?;
        if entry.1 > Instant::now() {
            Some(entry.0)
        } else {
            drop(entry);
            self.inner.remove(token);
            None
        }
    }

    pub fn remove(&self, token: &str) {
        self.inner.remove(token);
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.inner.len();
        let now = Instant::now();
        self.inner.retain(|_, (_, expires)| *expires > now);
        before.saturating_sub(self.inner.len())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub tokens: TokenIssuer,
    pub sessions: SessionStore,
    pub limits: RateLimits,
    pub uploads: UploadStore,
    pub max_upload_bytes: usize,
    pub cookie_key: Key,
    pub secure_cookies: bool,
    pub search_threshold: u8,
}

impl AppState {
    pub fn new(config: &AppConfig, pool: SqlitePool) -> Self {
        let cookie_key = match config.secret_key_bytes() {
            Some(secret) => Key::derive_from(secret),
            None => {
                warn!("using a random cookie signing key");
                Key::generate()
            }
        };

        Self {
            pool,
            tokens: TokenIssuer::new(&config.api_key, config.token_ttl),
            sessions: SessionStore::new(config.session_ttl, config.remember_ttl),
            limits: RateLimits::new(&config.rate_limits),
            uploads: UploadStore::new(config.upload_dir.clone()),
            max_upload_bytes: config.max_upload_bytes,
            cookie_key,
            secure_cookies: config.secure_cookies,
            search_threshold: config.search_threshold,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("tokens", &self.tokens)
            .field("limits", &self.limits)
            .field("uploads", &self.uploads)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("secure_cookies", &self.secure_cookies)
            .field("search_threshold", &self.search_threshold)
            .finish_non_exhaustive()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl FromRef<AppState> for RateLimits {
    fn from_ref(state: &AppState) -> Self {
        state.limits.clone()
    }
}
