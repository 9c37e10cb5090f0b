use crate::config::Settings;
use crate::directory::Directory;
use crate::store::rate_limit::RateLimiter;
use crate::store::session::SessionAuthenticator;
use crate::store::texture::TextureStore;
use crate::store::token::TokenStore;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post, put},
    Extension, Router,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer, request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod handlers;

/// Shared state behind every handler. The stores are individually
/// thread-safe; nothing here needs an outer lock.
pub struct AppState {
    pub directory: Directory,
    pub tokens: TokenStore,
    pub sessions: SessionAuthenticator,
    pub rate_limiter: RateLimiter,
    pub textures: TextureStore,
    pub login_with_character_name: bool,
    pub skin_domains: Vec<String>,
    pub meta: BTreeMap<String, Value>,
}

impl AppState {
    /// Build the directory and stores from settings, loading any seed
    /// textures through the content store so they deduplicate exactly like
    /// uploads.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let directory = Directory::build(&settings.users)?;
        let textures = TextureStore::new(&settings.server.root_url);

        for seed in &settings.users {
            for character in &seed.characters {
                let Some(name) = character.name.as_deref() else {
                    continue;
                };
                let Some(persona) = directory.find_persona_by_name(name) else {
                    continue;
                };
                for (kind, path) in &character.textures {
                    let bytes = std::fs::read(path).with_context(|| {
                        format!("unable to read seed texture {path} for character {name}")
                    })?;
                    let texture = textures.store(&bytes).with_context(|| {
                        format!("undecodable seed texture {path} for character {name}")
                    })?;
                    persona.set_texture(*kind, texture);
                }
            }
        }

        Ok(Self {
            directory,
            tokens: TokenStore::new(settings.token.options()),
            sessions: SessionAuthenticator::new(settings.session.auth_expire_time),
            rate_limiter: RateLimiter::new(settings.rate_limit.limit_duration),
            textures,
            login_with_character_name: settings.core.login_with_character_name,
            skin_domains: settings.skin_domains.clone(),
            meta: settings.meta.clone(),
        })
    }
}

/// Assemble the full route table and middleware stack around `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::meta::root))
        .route("/status", get(handlers::meta::status))
        .route("/authserver/authenticate", post(handlers::auth::authenticate))
        .route("/authserver/refresh", post(handlers::auth::refresh))
        .route("/authserver/validate", post(handlers::auth::validate))
        .route("/authserver/invalidate", post(handlers::auth::invalidate))
        .route("/authserver/signout", post(handlers::auth::signout))
        .route(
            "/sessionserver/session/minecraft/join",
            post(handlers::session::join),
        )
        .route(
            "/sessionserver/session/minecraft/hasJoined",
            get(handlers::session::has_joined),
        )
        .route(
            "/sessionserver/session/minecraft/profile/:uuid",
            get(handlers::profiles::profile),
        )
        .route("/api/profiles/minecraft", post(handlers::profiles::query))
        .route("/textures/:hash", get(handlers::textures::serve))
        .route(
            "/api/user/profile/:uuid/:kind",
            put(handlers::textures::upload).delete(handlers::textures::remove),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CorsLayer::permissive())
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(port: u16, settings: &Settings) -> Result<()> {
    let state = Arc::new(AppState::from_settings(settings)?);
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
