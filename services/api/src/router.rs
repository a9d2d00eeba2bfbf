//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AudioListResponse, ErrorResponse, ModelListResponse, ModelSummary, SharePayload,
        ShareResponse, SharedConversationView,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::share_conversation,
        handlers::list_audio,
        handlers::get_shared_conversation,
        handlers::get_audio_file,
        handlers::list_models,
    ),
    components(
        schemas(
            SharePayload,
            ShareResponse,
            AudioListResponse,
            SharedConversationView,
            ModelListResponse,
            ModelSummary,
            ErrorResponse
        )
    ),
    tags(
        (name = "Duologue API", description = "Sharing and replaying two-agent AI conversations")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/conversations/share", post(handlers::share_conversation))
        .route("/conversations/audio", get(handlers::list_audio))
        .route("/conversations/{id}", get(handlers::get_shared_conversation))
        .route(
            "/conversations/{id}/audio/{file}",
            get(handlers::get_audio_file),
        )
        .route("/models", get(handlers::list_models))
        .route("/ws", get(ws_handler))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
