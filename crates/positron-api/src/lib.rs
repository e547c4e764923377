pub mod auth;
pub mod chats;
pub mod error;
pub mod gemini;
pub mod generate;
pub mod middleware;
pub mod persona;

use axum::{
    Json, Router,
    middleware as axum_middleware,
    routing::{get, post},
};

use positron_types::api::HealthResponse;

use crate::auth::AppState;
use crate::middleware::require_auth;

/// REST surface: the relay, dev login, health, and the signed-in chat routes.
/// The WebSocket gateway and static files are mounted by the server binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/generate", post(generate::generate))
        .route("/auth/dev-login", post(auth::dev_login))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/chats", get(chats::list_chats).post(chats::create_chat))
        .route(
            "/api/chats/{chat_id}",
            get(chats::get_chat)
                .put(chats::save_chat)
                .delete(chats::delete_chat),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
