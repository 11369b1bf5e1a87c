use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};
use tracing::error;

use ufb_db::Database;

use crate::error::ApiError;
use crate::mailer::Mailer;

/// Runtime settings the handlers need. Built by the server binary from the
/// environment.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    /// Base URL the session route calls to exchange OAuth codes.
    pub session_upstream_url: String,
    pub secure_cookies: bool,
}

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<ApiConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub http: reqwest::Client,
    cookie_key: Key,
}

impl AppState {
    pub fn new(db: Database, config: ApiConfig, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        // Key::from needs 64 bytes of key material.
        let digest = Sha512::new()
            .chain_update(b"ufb-session-cookie:")
            .chain_update(config.jwt_secret.as_bytes())
            .finalize();
        let cookie_key = Key::from(digest.as_slice());

        Ok(Self {
            db: Arc::new(db),
            config: Arc::new(config),
            mailer,
            http,
            cookie_key,
        })
    }

    /// Run blocking database work off the async runtime.
    pub async fn with_db<F, T, E>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<ApiError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow::anyhow!("blocking task failed"))
            })?
            .map_err(Into::into)
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
