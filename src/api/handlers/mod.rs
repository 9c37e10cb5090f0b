pub mod auth;
pub mod meta;
pub mod profiles;
pub mod session;
pub mod textures;

// common helpers for the handlers

use crate::api::AppState;
use crate::directory::User;
use crate::error::ApiError;
use crate::store::token::{AvailableLevel, Token};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::sync::Arc;
use tracing::debug;

/// Resolve a username/password pair to a user, going through the rate
/// limiter first. Unknown user, limited attempt, and wrong password all
/// fail identically.
pub(super) fn password_authenticated(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<Arc<User>, ApiError> {
    let user = state
        .directory
        .find_user_by_email(username)
        .ok_or(ApiError::InvalidCredentials)?;

    if !state.rate_limiter.try_acquire(&user) {
        debug!("password attempt for {username} rate-limited");
        return Err(ApiError::InvalidCredentials);
    }

    if !user.password_matches(password) {
        return Err(ApiError::InvalidCredentials);
    }

    Ok(user)
}

/// Token lookup that surfaces every miss as `InvalidToken`.
pub(super) fn token_authenticated(
    state: &AppState,
    access_token: &str,
    client_token: Option<&str>,
    level: AvailableLevel,
) -> Result<Arc<Token>, ApiError> {
    state
        .tokens
        .authenticate(access_token, client_token, level)
        .ok_or(ApiError::InvalidToken)
}

/// Bearer authorization for the texture management endpoints: a missing or
/// non-COMPLETE token is a bare 401.
pub(super) fn bearer_authenticated(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<Token>, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let access_token = header
        .trim()
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;
    state
        .tokens
        .authenticate(access_token, None, AvailableLevel::Complete)
        .ok_or(ApiError::Unauthorized)
}
