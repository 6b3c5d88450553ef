//! Login: one directory lookup resolves username-or-email to an email and
//! role, then the identity provider checks the credential. Every rejection
//! on the way out is the same generic message.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::identity::{IdentityProvider, Principal, TokenService};
use crate::store::Store;

use super::AuthUser;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Username or email address.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: AuthUser,
}

pub async fn login(
    store: &dyn Store,
    idp: &dyn IdentityProvider,
    tokens: &TokenService,
    req: LoginRequest,
) -> AppResult<LoginResponse> {
    let ident = req.username.trim();
    if ident.is_empty() || req.password.is_empty() {
        return Err(AppError::invalid_credentials());
    }

    // Single unified lookup with fixed precedence; a miss is reported
    // exactly like a bad password.
    let Some(entry) = store.resolve_login(ident).await? else {
        return Err(AppError::invalid_credentials());
    };

    let account = idp.sign_in(&entry.email, &req.password).await?;

    let username = entry.username.clone().unwrap_or_else(|| ident.to_string());
    let principal = Principal {
        account_id: account.id,
        email: entry.email.clone(),
        username: username.clone(),
        role: entry.role,
    };
    let token = tokens.issue(&principal)?;
    info!(target: "login", "login ok user={} role={}", username, entry.role.as_str());
    Ok(LoginResponse {
        token,
        user: AuthUser {
            account_id: account.id,
            profile_id: entry.profile_id,
            username,
            email: entry.email,
            role: entry.role,
            redirect: entry.role.dashboard_path().to_string(),
        },
    })
}
