//! User-visible error taxonomy and its wire mapping.
//!
//! Every failure is terminal for the request that hit it. The envelope is
//! the classic yggdrasil shape: `{"error": ..., "errorMessage": ...}` with
//! 403 for forbidden operations and 400 for malformed arguments. Rate
//! limiting and wrong passwords share one message on purpose so callers
//! cannot tell which check failed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid credentials. Invalid username or password.")]
    InvalidCredentials,
    #[error("Invalid token.")]
    InvalidToken,
    #[error("Access token already has a profile assigned.")]
    TokenAlreadyBound,
    #[error("No such profile.")]
    ProfileNotFound,
    #[error("Access denied.")]
    AccessDenied,
    #[error("Invalid profile.")]
    InvalidProfile,
    #[error("bad image")]
    BadImage,
    /// Bearer-authorization failure on the texture management endpoints:
    /// plain 401, empty body.
    #[error("unauthorized")]
    Unauthorized,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::InvalidToken
            | Self::AccessDenied
            | Self::InvalidProfile => StatusCode::FORBIDDEN,
            Self::TokenAlreadyBound | Self::ProfileNotFound | Self::BadImage => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    fn wire_name(&self) -> &'static str {
        match self.status() {
            StatusCode::FORBIDDEN => "ForbiddenOperationException",
            _ => "IllegalArgumentException",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Unauthorized) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let body = Json(json!({
            "error": self.wire_name(),
            "errorMessage": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
