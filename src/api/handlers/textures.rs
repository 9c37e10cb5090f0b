//! Texture serving and per-persona texture management.

use super::bearer_authenticated;
use crate::api::AppState;
use crate::directory::{ModelKind, Persona, TextureKind};
use crate::error::ApiError;
use crate::ids;
use axum::{
    extract::{Extension, Multipart, Path},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Content is immutable per hash, so the hash doubles as a strong
/// validator and the cache lifetime can be generous.
const CACHE_CONTROL: &str = "max-age=2592000, public";

pub async fn serve(state: Extension<Arc<AppState>>, Path(hash): Path<String>) -> Response {
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return StatusCode::NOT_FOUND.into_response();
    }
    match state.textures.fetch(&hash) {
        Some(texture) => (
            [
                (header::CONTENT_TYPE, "image/png".to_string()),
                (header::ETAG, format!("\"{}\"", texture.hash)),
                (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
            ],
            texture.data.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn upload(
    state: Extension<Arc<AppState>>,
    Path((uuid, kind)): Path<(String, String)>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let (persona, kind) = authorized_texture_operation(&state, &uuid, &kind, &headers)?;

    let mut file: Option<Vec<u8>> = None;
    let mut model: Option<String> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name() {
            Some("file") => file = field.bytes().await.ok().map(|b| b.to_vec()),
            Some("model") => model = field.text().await.ok(),
            _ => {}
        }
    }
    let file = file.ok_or(ApiError::BadImage)?;

    let texture = state.textures.store(&file).map_err(|err| {
        warn!("unable to parse uploaded texture: {err}");
        ApiError::BadImage
    })?;
    persona.set_texture(kind, texture);

    if kind == TextureKind::Skin {
        if model.as_deref() == Some("slim") {
            persona.set_model(ModelKind::Alex);
        } else {
            persona.set_model(ModelKind::Steve);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove(
    state: Extension<Arc<AppState>>,
    Path((uuid, kind)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let (persona, kind) = authorized_texture_operation(&state, &uuid, &kind, &headers)?;
    persona.remove_texture(kind);
    Ok(StatusCode::NO_CONTENT)
}

/// Shared authorization for texture management: bearer token, existing
/// persona, ownership, and per-persona uploadability.
fn authorized_texture_operation(
    state: &AppState,
    uuid: &str,
    kind: &str,
    headers: &HeaderMap,
) -> Result<(Arc<Persona>, TextureKind), ApiError> {
    let token = bearer_authenticated(state, headers)?;
    let kind = TextureKind::from_path_segment(kind).ok_or(ApiError::ProfileNotFound)?;
    let id = ids::parse_undashed(uuid).ok_or(ApiError::ProfileNotFound)?;
    let persona = state
        .directory
        .find_persona_by_id(id)
        .ok_or(ApiError::ProfileNotFound)?;
    let owned = persona
        .owner()
        .is_some_and(|owner| Arc::ptr_eq(&owner, token.user()));
    if !owned {
        return Err(ApiError::AccessDenied);
    }
    if !persona.can_upload(kind) {
        return Err(ApiError::AccessDenied);
    }
    Ok((persona, kind))
}
