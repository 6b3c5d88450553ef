//! Environment-driven configuration. One struct gathered at startup; every
//! knob has a default so a bare `mock` run needs no environment at all.

use anyhow::{bail, Result};
use tracing::warn;

/// Which backend pair (store + identity provider) to wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-memory store and identity provider with seeded demo accounts.
    Mock,
    /// Hosted relational store and hosted identity provider over HTTP.
    Hosted,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
    pub backend: Backend,
    pub store_url: Option<String>,
    pub store_api_key: Option<String>,
    pub auth_url: Option<String>,
    pub auth_api_key: Option<String>,
    pub jwt_secret: String,
    /// Cap on the therapist dashboard's recent-sessions list.
    pub recent_sessions_limit: usize,
}

const DEV_JWT_SECRET: &str = "ownurvoice-dev-secret-change-me";

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<AppConfig> {
        let http_port = env_opt("OWNURVOICE_HTTP_PORT")
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(7878);
        let backend = match env_opt("OWNURVOICE_BACKEND").as_deref() {
            None | Some("mock") => Backend::Mock,
            Some("hosted") => Backend::Hosted,
            Some(other) => bail!("OWNURVOICE_BACKEND must be 'mock' or 'hosted', got '{}'", other),
        };
        let store_url = env_opt("OWNURVOICE_STORE_URL");
        let store_api_key = env_opt("OWNURVOICE_STORE_API_KEY");
        let auth_url = env_opt("OWNURVOICE_AUTH_URL");
        let auth_api_key = env_opt("OWNURVOICE_AUTH_API_KEY");
        if backend == Backend::Hosted {
            if store_url.is_none() || store_api_key.is_none() {
                bail!("hosted backend requires OWNURVOICE_STORE_URL and OWNURVOICE_STORE_API_KEY");
            }
            if auth_url.is_none() || auth_api_key.is_none() {
                bail!("hosted backend requires OWNURVOICE_AUTH_URL and OWNURVOICE_AUTH_API_KEY");
            }
        }
        let jwt_secret = env_opt("OWNURVOICE_JWT_SECRET").unwrap_or_else(|| {
            warn!("OWNURVOICE_JWT_SECRET not set; using the dev secret");
            DEV_JWT_SECRET.to_string()
        });
        let recent_sessions_limit = env_opt("OWNURVOICE_RECENT_SESSIONS_LIMIT")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(10);
        Ok(AppConfig {
            http_port,
            backend,
            store_url,
            store_api_key,
            auth_url,
            auth_api_key,
            jwt_secret,
            recent_sessions_limit,
        })
    }

    /// Config for tests and the default mock run.
    pub fn mock_default() -> AppConfig {
        AppConfig {
            http_port: 7878,
            backend: Backend::Mock,
            store_url: None,
            store_api_key: None,
            auth_url: None,
            auth_api_key: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            recent_sessions_limit: 10,
        }
    }
}
