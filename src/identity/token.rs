//! Bearer tokens issued at login and checked on every protected request.
//! HS256 with a shared secret; seven-day expiry matching what the old
//! in-memory backend issued.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::Role;

use super::principal::Principal;

/// 7 days.
pub const TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, principal: &Principal) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: principal.account_id,
            email: principal.email.clone(),
            username: principal.username.clone(),
            role: principal.role,
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::internal("token_encode_failed", &e.to_string()))
    }

    pub fn verify(&self, token: &str) -> AppResult<Principal> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AppError::auth("invalid_token", "invalid or expired token"))?;
        Ok(Principal {
            account_id: data.claims.sub,
            email: data.claims.email,
            username: data.claims.username,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            account_id: Uuid::new_v4(),
            email: "will@example.com".into(),
            username: "Will".into(),
            role: Role::Patient,
        }
    }

    #[test]
    fn issue_then_verify_round_trips_principal() {
        let svc = TokenService::new("test-secret");
        let p = principal();
        let token = svc.issue(&p).unwrap();
        let back = svc.verify(&token).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let svc = TokenService::new("test-secret");
        let other = TokenService::new("other-secret");
        let token = svc.issue(&principal()).unwrap();
        let err = other.verify(&token).unwrap_err();
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn verify_rejects_garbage() {
        let svc = TokenService::new("test-secret");
        assert!(svc.verify("not-a-token").is_err());
    }
}
