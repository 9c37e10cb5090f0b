//! Join/verify handshake endpoints.

use super::profiles;
use crate::api::AppState;
use crate::error::ApiError;
use crate::ids;
use crate::store::token::AvailableLevel;
use axum::{
    extract::{ConnectInfo, Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    access_token: String,
    selected_profile: String,
    server_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HasJoinedQuery {
    username: String,
    server_id: String,
    ip: Option<String>,
}

pub async fn join(
    state: Extension<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<JoinRequest>,
) -> Result<StatusCode, ApiError> {
    let token = state
        .tokens
        .authenticate(&req.access_token, None, AvailableLevel::Complete)
        .ok_or(ApiError::InvalidToken)?;

    let bound = token
        .persona()
        .is_some_and(|persona| ids::undashed(persona.id()) == req.selected_profile);
    if !bound {
        return Err(ApiError::InvalidProfile);
    }

    let ip = peer.map(|ConnectInfo(addr)| addr.ip().to_string());
    state.sessions.record_join(token, &req.server_id, ip);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn has_joined(
    state: Extension<Arc<AppState>>,
    Query(query): Query<HasJoinedQuery>,
) -> Response {
    match state
        .sessions
        .verify(&query.username, &query.server_id, query.ip.as_deref())
    {
        Some(persona) => Json(profiles::complete_profile(&persona)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
