//! Identity-provider seam. The service never stores credentials itself;
//! sign-up and sign-in delegate to whichever provider is configured.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::Account;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account for email + password. Fails with `Conflict` on a
    /// duplicate email, `Identity` on any other provider rejection.
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Account>;

    /// Authenticate email + password. Any credential mismatch maps to the
    /// generic `Auth` error; only transport/provider faults map to `Identity`.
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Account>;
}

/// Adapter for the hosted auth service's password endpoints.
pub struct HostedIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SignUpBody {
    id: Option<Uuid>,
    user: Option<SignUpUser>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignUpUser {
    id: Uuid,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: String,
    user: SignUpUser,
}

impl HostedIdentityProvider {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn transport_err(e: reqwest::Error) -> AppError {
        AppError::identity("identity_unreachable", format!("identity provider unreachable: {}", e))
    }
}

#[async_trait]
impl IdentityProvider for HostedIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Account> {
        let url = format!("{}/signup", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(Self::transport_err)?;
        let status = resp.status();
        if status.as_u16() == 409 || status.as_u16() == 422 {
            return Err(AppError::conflict("email_taken", "an account with this email already exists"));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::identity("signup_rejected", format!("identity provider rejected sign-up: {}", body)));
        }
        let body: SignUpBody = resp
            .json()
            .await
            .map_err(|e| AppError::identity("signup_bad_body", format!("unexpected sign-up response: {}", e)))?;
        // Providers differ on whether the account sits at the top level or
        // under "user".
        let (id, acct_email) = match (body.id, body.user) {
            (Some(id), _) => (id, body.email),
            (None, Some(u)) => (u.id, u.email),
            (None, None) => {
                return Err(AppError::identity("signup_bad_body", "sign-up response carried no account id"))
            }
        };
        debug!(target: "identity", "sign_up ok account_id={}", id);
        Ok(Account {
            id,
            email: acct_email.unwrap_or_else(|| email.to_string()),
            provider_token: None,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Account> {
        let url = format!("{}/token?grant_type=password", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(Self::transport_err)?;
        let status = resp.status();
        if status.is_client_error() {
            // Wrong password and unknown email both land here; stay generic.
            return Err(AppError::invalid_credentials());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::identity("signin_failed", format!("identity provider error: {}", body)));
        }
        let body: TokenBody = resp
            .json()
            .await
            .map_err(|e| AppError::identity("signin_bad_body", format!("unexpected sign-in response: {}", e)))?;
        Ok(Account {
            id: body.user.id,
            email: body.user.email.unwrap_or_else(|| email.to_string()),
            provider_token: Some(body.access_token),
        })
    }
}
