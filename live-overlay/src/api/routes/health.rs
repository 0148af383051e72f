//! Health check routes.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::{ComponentHealth, HealthResponse, LivenessResponse};
use crate::api::server::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
}

/// Component health and uptime.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut components = Vec::new();
    let mut healthy = true;

    if let Some(pool) = &state.db_pool {
        let db = sqlx::query("SELECT 1").execute(pool).await;
        healthy &= db.is_ok();
        components.push(ComponentHealth {
            name: "database".to_string(),
            status: if db.is_ok() { "healthy" } else { "unhealthy" }.to_string(),
            message: db.err().map(|e| e.to_string()),
        });
    }

    healthy &= state.transcoder_version.is_some();
    components.push(ComponentHealth {
        name: "transcoder".to_string(),
        status: if state.transcoder_version.is_some() {
            "healthy"
        } else {
            "unavailable"
        }
        .to_string(),
        message: state.transcoder_version.clone(),
    });

    components.push(ComponentHealth {
        name: "streams".to_string(),
        status: "healthy".to_string(),
        message: Some(format!("{} active", state.supervisor.active_streams())),
    });

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        components,
    })
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = LivenessResponse)
    )
)]
pub async fn liveness_check(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
