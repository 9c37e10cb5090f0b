//! Server metadata and diagnostics.

use crate::api::AppState;
use axum::{extract::Extension, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// Metadata document advertised at the API root.
pub async fn root(state: Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "meta": state.meta,
        "skinDomains": state.skin_domains,
    }))
}

/// Live store counts, for diagnostics only.
pub async fn status(state: Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "user.count": state.directory.users().len(),
        "token.count": state.tokens.token_count(),
        "pendingAuthentication.count": state.sessions.pending_count(),
    }))
}
