//! In-memory identity provider used by the mock backend and tests.
//! Argon2 PHC hashes, case-insensitive emails, opaque session tokens.

use std::collections::HashMap;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use base64::Engine;
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::Account;

use super::provider::IdentityProvider;

#[derive(Debug, Clone)]
struct LocalAccount {
    id: Uuid,
    password_hash: String,
}

#[derive(Default)]
pub struct LocalIdentityProvider {
    // email (lower-cased) -> account
    accounts: RwLock<HashMap<String, LocalAccount>>,
}

fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|e| AppError::internal("salt_failed", &e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::internal("salt_failed", &e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal("hash_failed", &e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

fn gen_token() -> AppResult<String> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf)
        .map_err(|e| AppError::internal("token_failed", e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

impl LocalIdentityProvider {
    pub fn new() -> Self { Self::default() }

    /// Seed an account directly, bypassing the duplicate check. Used for the
    /// demo dataset and tests.
    pub fn seed(&self, email: &str, password: &str, id: Uuid) {
        let phc = match hash_password(password) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "identity", "seed skipped for {}: {}", email, e);
                return;
            }
        };
        self.accounts
            .write()
            .insert(email.trim().to_ascii_lowercase(), LocalAccount { id, password_hash: phc });
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Account> {
        let key = email.trim().to_ascii_lowercase();
        let phc = hash_password(password)?;
        let mut map = self.accounts.write();
        if map.contains_key(&key) {
            return Err(AppError::conflict("email_taken", "an account with this email already exists"));
        }
        let id = Uuid::new_v4();
        map.insert(key.clone(), LocalAccount { id, password_hash: phc });
        debug!(target: "identity", "local sign_up email={} account_id={}", key, id);
        Ok(Account { id, email: key, provider_token: None })
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Account> {
        let key = email.trim().to_ascii_lowercase();
        let acct = {
            let map = self.accounts.read();
            map.get(&key).cloned()
        };
        // Same generic error for unknown email and bad password.
        let Some(acct) = acct else { return Err(AppError::invalid_credentials()); };
        if !verify_password(&acct.password_hash, password) {
            return Err(AppError::invalid_credentials());
        }
        Ok(Account { id: acct.id, email: key, provider_token: Some(gen_token()?) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::INVALID_CREDENTIALS;

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let idp = LocalIdentityProvider::new();
        let acct = idp.sign_up("Will@Example.com", "WD1234").await.unwrap();
        let back = idp.sign_in("will@example.com", "WD1234").await.unwrap();
        assert_eq!(acct.id, back.id);
        assert!(back.provider_token.is_some());
    }

    #[tokio::test]
    async fn session_tokens_are_distinct_per_sign_in() {
        let idp = LocalIdentityProvider::new();
        idp.sign_up("will@example.com", "WD1234").await.unwrap();
        let a = idp.sign_in("will@example.com", "WD1234").await.unwrap();
        let b = idp.sign_in("will@example.com", "WD1234").await.unwrap();
        let (a, b) = (a.provider_token.unwrap(), b.provider_token.unwrap());
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let idp = LocalIdentityProvider::new();
        idp.sign_up("will@example.com", "WD1234").await.unwrap();
        let err = idp.sign_up("will@example.com", "other1").await.unwrap_err();
        assert_eq!(err.http_status(), 409);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_report_identically() {
        let idp = LocalIdentityProvider::new();
        idp.sign_up("will@example.com", "WD1234").await.unwrap();
        let e1 = idp.sign_in("will@example.com", "nope99").await.unwrap_err();
        let e2 = idp.sign_in("nobody@example.com", "WD1234").await.unwrap_err();
        assert_eq!(e1.message(), INVALID_CREDENTIALS);
        assert_eq!(e1.message(), e2.message());
        assert_eq!(e1.code_str(), e2.code_str());
    }
}
