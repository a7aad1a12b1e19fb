//! Unified application error model and mapping helpers.
//! Every token lifecycle operation fails with an `AppError`: a transport status paired with
//! a machine-readable cause code and a caller-facing message. The HTTP layer renders it as
//! `{ "error": message }`; nothing else in the crate knows about HTTP.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const INCORRECT_CREDENTIALS: &str = "incorrect email or password";
pub const NOT_AUTHENTICATED: &str = "not authenticated";
pub const REFRESH_EXPIRED: &str = "refresh token expired";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    IncorrectCredentials { code: String, message: String },
    NotAuthenticated { code: String, message: String },
    Malformed { code: String, message: String },
    UnprocessableState { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::IncorrectCredentials { code, .. }
            | AppError::NotAuthenticated { code, .. }
            | AppError::Malformed { code, .. }
            | AppError::UnprocessableState { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::IncorrectCredentials { message, .. }
            | AppError::NotAuthenticated { message, .. }
            | AppError::Malformed { message, .. }
            | AppError::UnprocessableState { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    /// Login failure. The message never says which half of the credentials was wrong.
    pub fn incorrect_credentials<C: Into<String>>(code: C) -> Self {
        AppError::IncorrectCredentials { code: code.into(), message: INCORRECT_CREDENTIALS.into() }
    }
    /// Missing, invalid, expired or revoked token. The caller only ever sees `message`.
    pub fn not_authenticated<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::NotAuthenticated { code: code.into(), message: msg.into() } }
    pub fn malformed<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Malformed { code: code.into(), message: msg.into() } }
    pub fn unprocessable<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::UnprocessableState { code: code.into(), message: msg.into() } }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::IncorrectCredentials { .. } => 401,
            AppError::NotAuthenticated { .. } => 401,
            AppError::Malformed { .. } => 400,
            AppError::UnprocessableState { .. } => 422,
            AppError::Internal { .. } => 500,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
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
        AppError::UnprocessableState { code: "unprocessable".into(), message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(serde_json::json!({ "error": self.message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::incorrect_credentials("bad_password").http_status(), 401);
        assert_eq!(AppError::not_authenticated("revoked", NOT_AUTHENTICATED).http_status(), 401);
        assert_eq!(AppError::malformed("bad_json", "oops").http_status(), 400);
        assert_eq!(AppError::unprocessable("registry_write", "down").http_status(), 422);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn incorrect_credentials_message_is_generic() {
        let unknown_email = AppError::incorrect_credentials("user_not_found");
        let bad_password = AppError::incorrect_credentials("password_mismatch");
        assert_eq!(unknown_email.message(), bad_password.message());
        assert_eq!(unknown_email.message(), "incorrect email or password");
        assert_ne!(unknown_email.code_str(), bad_password.code_str());
    }

    #[test]
    fn anyhow_maps_to_unprocessable() {
        let e: AppError = anyhow::anyhow!("registry unreachable").into();
        assert_eq!(e.http_status(), 422);
        assert_eq!(e.message(), "registry unreachable");
    }

    #[tokio::test]
    async fn into_response_renders_error_body() {
        let resp = AppError::incorrect_credentials("password_mismatch").into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v, serde_json::json!({"error": "incorrect email or password"}));
    }
}
