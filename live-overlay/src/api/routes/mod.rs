//! API route modules.

pub mod health;
pub mod logging;
pub mod settings;
pub mod stream;

use axum::{Json, Router, middleware::from_fn_with_state, routing::get};
use utoipa::OpenApi;

use crate::api::middleware::jwt_auth_middleware;
use crate::api::openapi::ApiDoc;
use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .nest("/api/stream", stream::router())
        .nest("/api/stream/settings", settings::router())
        .nest("/api/logging", logging::router())
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        .merge(protected)
        .nest("/api/health", health::router())
        .route("/api/openapi.json", get(openapi_json))
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
