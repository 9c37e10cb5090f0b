//! Credential and token lifecycle endpoints.

use super::{password_authenticated, profiles, token_authenticated};
use crate::api::AppState;
use crate::error::ApiError;
use crate::ids;
use crate::store::token::AvailableLevel;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    username: String,
    password: String,
    client_token: Option<String>,
    #[serde(default)]
    request_user: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    access_token: String,
    client_token: Option<String>,
    #[serde(default)]
    request_user: bool,
    selected_profile: Option<ProfileBody>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileBody {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    access_token: String,
    client_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateRequest {
    access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SignoutRequest {
    username: String,
    password: String,
}

pub async fn authenticate(
    state: Extension<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut character = None;
    if state.login_with_character_name {
        character = state.directory.find_persona_by_name(&req.username);
    }

    let user = match &character {
        Some(persona) => {
            let owner = persona.owner().ok_or(ApiError::InvalidCredentials)?;
            password_authenticated(&state, owner.email(), &req.password)?
        }
        None => password_authenticated(&state, &req.username, &req.password)?,
    };

    let token = state
        .tokens
        .issue(&user, req.client_token.as_deref(), character)
        .map_err(|_| ApiError::InvalidProfile)?;

    let mut response = json!({
        "accessToken": token.access_token(),
        "clientToken": token.client_token(),
        "availableProfiles": user
            .personas()
            .iter()
            .map(|p| profiles::simple_profile(p))
            .collect::<Vec<_>>(),
    });
    if let Some(persona) = token.persona() {
        response["selectedProfile"] = profiles::simple_profile(persona);
    }
    if req.request_user {
        response["user"] = profiles::user_document(&user);
    }

    Ok(Json(response))
}

pub async fn refresh(
    state: Extension<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<Value>, ApiError> {
    let character_to_select = match &req.selected_profile {
        None => None,
        Some(profile) => {
            let id = ids::parse_undashed(&profile.id).ok_or(ApiError::ProfileNotFound)?;
            let persona = state
                .directory
                .find_persona_by_id(id)
                .ok_or(ApiError::ProfileNotFound)?;
            if persona.name() != profile.name {
                return Err(ApiError::ProfileNotFound);
            }
            Some(persona)
        }
    };

    let old_token = state
        .tokens
        .authenticate_and_consume(
            &req.access_token,
            req.client_token.as_deref(),
            AvailableLevel::Partial,
            |token| {
                if let Some(persona) = &character_to_select {
                    if token.persona().is_some() {
                        return Err(ApiError::TokenAlreadyBound);
                    }
                    let owned = persona
                        .owner()
                        .is_some_and(|owner| Arc::ptr_eq(&owner, token.user()));
                    if !owned {
                        return Err(ApiError::AccessDenied);
                    }
                }
                Ok(true)
            },
        )?
        .ok_or(ApiError::InvalidToken)?;

    let rebind = character_to_select.or_else(|| old_token.persona().cloned());
    let new_token = state
        .tokens
        .issue(old_token.user(), Some(old_token.client_token()), rebind)
        .map_err(|_| ApiError::AccessDenied)?;

    let mut response = json!({
        "accessToken": new_token.access_token(),
        "clientToken": new_token.client_token(),
    });
    if let Some(persona) = new_token.persona() {
        response["selectedProfile"] = profiles::simple_profile(persona);
    }
    if req.request_user {
        response["user"] = profiles::user_document(new_token.user());
    }

    Ok(Json(response))
}

pub async fn validate(
    state: Extension<Arc<AppState>>,
    Json(req): Json<ValidateRequest>,
) -> Result<StatusCode, ApiError> {
    token_authenticated(
        &state,
        &req.access_token,
        req.client_token.as_deref(),
        AvailableLevel::Complete,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

/// Idempotent: consuming an already-gone token is still a 204.
pub async fn invalidate(
    state: Extension<Arc<AppState>>,
    Json(req): Json<InvalidateRequest>,
) -> impl IntoResponse {
    let _ = state.tokens.authenticate_and_consume::<ApiError>(
        &req.access_token,
        None,
        AvailableLevel::Partial,
        |_| Ok(true),
    );
    StatusCode::NO_CONTENT
}

pub async fn signout(
    state: Extension<Arc<AppState>>,
    Json(req): Json<SignoutRequest>,
) -> Result<StatusCode, ApiError> {
    let user = password_authenticated(&state, &req.username, &req.password)?;
    state.tokens.revoke_all(&user);
    Ok(StatusCode::NO_CONTENT)
}
