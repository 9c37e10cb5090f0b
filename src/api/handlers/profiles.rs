//! Profile documents and lookups.

use crate::api::AppState;
use crate::directory::{Persona, TextureKind};
use crate::ids;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64ct::{Base64, Encoding};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Minimal profile reference: id and name only.
pub(super) fn simple_profile(persona: &Persona) -> Value {
    json!({
        "id": ids::undashed(persona.id()),
        "name": persona.name(),
    })
}

/// Full profile document with the base64-encoded `textures` property.
pub(super) fn complete_profile(persona: &Persona) -> Value {
    let mut slots = Map::new();
    for (kind, texture) in persona.textures() {
        let slot = match kind {
            TextureKind::Skin => json!({
                "url": texture.url,
                "metadata": { "model": persona.model().model_name() },
            }),
            _ => json!({ "url": texture.url }),
        };
        slots.insert(kind.wire_name().to_string(), slot);
    }

    let payload = json!({
        "timestamp": unix_millis(),
        "profileId": ids::undashed(persona.id()),
        "profileName": persona.name(),
        "textures": slots,
    });

    json!({
        "id": ids::undashed(persona.id()),
        "name": persona.name(),
        "properties": [{
            "name": "textures",
            "value": Base64::encode_string(payload.to_string().as_bytes()),
        }],
    })
}

pub(super) fn user_document(user: &crate::directory::User) -> Value {
    json!({
        "id": ids::undashed(user.id()),
        "properties": [],
    })
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

/// Bulk name -> simple profile lookup; duplicates collapse and unknown
/// names are skipped.
pub async fn query(
    state: Extension<Arc<AppState>>,
    Json(names): Json<Vec<String>>,
) -> Json<Vec<Value>> {
    let mut seen = std::collections::HashSet::new();
    let profiles = names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .filter_map(|name| state.directory.find_persona_by_name(name))
        .map(|persona| simple_profile(&persona))
        .collect();
    Json(profiles)
}

/// Full profile document by undashed UUID; 204 when unknown.
pub async fn profile(state: Extension<Arc<AppState>>, Path(uuid): Path<String>) -> Response {
    if uuid.len() != 32 || !uuid.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(id) = ids::parse_undashed(&uuid) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.directory.find_persona_by_id(id) {
        Some(persona) => Json(complete_profile(&persona)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
