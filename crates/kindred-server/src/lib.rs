//! Kindred server library logic.

pub mod api;
pub mod api_accounts;
pub mod api_friends;
pub mod api_generate;
pub mod api_reply;
pub mod config;
pub mod image_store;
pub mod middleware;

use api_reply::InFlightReplies;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use image_store::ImageStore;
use kindred_db::DbPool;
use kindred_generation::{ChatBackend, ImageBackend};
use kindred_voice::SpeechSynthesizer;
use middleware::RateLimiter;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Friend-generation quota state.
    pub rate_limiter: RateLimiter,
    /// Key anonymous quotas on `X-Forwarded-For` instead of the socket peer.
    pub trust_forwarded_for: bool,
    /// Persona and reply text.
    pub chat: Arc<dyn ChatBackend>,
    /// Profile portraits.
    pub images: Arc<dyn ImageBackend>,
    /// Reply audio.
    pub speech: Arc<dyn SpeechSynthesizer>,
    /// Used to download portraits that come back as URLs.
    pub http: reqwest::Client,
    /// Where portraits are written and how they are addressed.
    pub image_store: ImageStore,
    /// Friends with a reply currently being produced.
    pub replies_in_flight: InFlightReplies,
}

/// Maximum request body size (64 KiB). Every request body is a small JSON object.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let upload_dir = state.image_store.upload_dir().to_path_buf();

    let protected_routes = Router::new()
        .route("/api/account", delete(api_accounts::delete_account_handler))
        .route("/api/account/stats", get(api_accounts::stats_handler))
        .route(
            "/api/friends/{friendId}",
            get(api_friends::get_friend_handler),
        )
        .layer(axum::middleware::from_fn(
            middleware::require_account_middleware,
        ));

    let api_routes = Router::new()
        .route("/api/accounts", post(api_accounts::register_handler))
        .route(
            "/api/friend",
            get(api_friends::current_friend_handler).post(api_friends::create_friend_handler),
        )
        .route("/api/generate", post(api_generate::generate_handler))
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(middleware::identify_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(api_routes)
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
