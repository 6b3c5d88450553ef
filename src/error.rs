//! Unified application error model and mapping helpers.
//! This module provides a common error enum used across the HTTP surface and
//! the flow/store/identity layers, along with the HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Generic credential-failure message. Shared by "unknown username" and
/// "wrong password" so the response does not reveal which one happened.
pub const INVALID_CREDENTIALS: &str = "invalid username or password";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Identity { code: String, message: String },
    Store { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Identity { code, .. }
            | AppError::Store { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Identity { message, .. }
            | AppError::Store { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn auth<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn identity<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Identity { code: code.into(), message: msg.into() } }
    pub fn store<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Store { code: code.into(), message: msg.into() } }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// The generic credential error. Always the same code and message
    /// regardless of which login step rejected.
    pub fn invalid_credentials() -> Self {
        AppError::Auth { code: "invalid_credentials".into(), message: INVALID_CREDENTIALS.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Identity { .. } => 502,
            AppError::Store { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Internal unless downcasted elsewhere
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({ "error": self });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("role", "blocked").http_status(), 403);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
        assert_eq!(AppError::identity("identity", "provider down").http_status(), 502);
        assert_eq!(AppError::store("store", "db down").http_status(), 503);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn credential_error_is_generic() {
        let e = AppError::invalid_credentials();
        assert_eq!(e.message(), INVALID_CREDENTIALS);
        assert_eq!(e.http_status(), 401);
    }

    #[test]
    fn serializes_with_type_tag() {
        let e = AppError::conflict("username_taken", "username already in use");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "conflict");
        assert_eq!(v["code"], "username_taken");
    }
}
