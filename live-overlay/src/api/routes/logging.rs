//! Runtime log filter routes.

use axum::{Extension, Json, Router, extract::State, routing::get};

use crate::api::error::{ApiError, ApiResult};
use crate::api::jwt::{ADMIN_ROLE, Claims};
use crate::api::models::{LoggingConfigResponse, UpdateLogFilterRequest};
use crate::api::server::AppState;
use crate::logging::LoggingConfig;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_log_filter).put(update_log_filter))
}

fn logging_config(state: &AppState) -> ApiResult<&LoggingConfig> {
    state
        .logging_config
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))
}

/// Current log filter directive.
#[utoipa::path(
    get,
    path = "/api/logging",
    tag = "logging",
    responses(
        (status = 200, description = "Current filter", body = LoggingConfigResponse),
        (status = 401, description = "Unauthorized", body = crate::api::error::ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_log_filter(State(state): State<AppState>) -> ApiResult<Json<LoggingConfigResponse>> {
    let config = logging_config(&state)?;
    Ok(Json(LoggingConfigResponse {
        filter: config.get_filter(),
    }))
}

/// Replace the log filter directive.
#[utoipa::path(
    put,
    path = "/api/logging",
    tag = "logging",
    request_body = UpdateLogFilterRequest,
    responses(
        (status = 200, description = "Filter updated", body = LoggingConfigResponse),
        (status = 403, description = "Caller is not an admin", body = crate::api::error::ApiErrorResponse),
        (status = 422, description = "Invalid directive", body = crate::api::error::ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_log_filter(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    if !claims.has_role(ADMIN_ROLE) {
        return Err(ApiError::forbidden("Changing the log filter requires the admin role"));
    }
    let config = logging_config(&state)?;
    config.set_filter(request.filter.trim())?;
    Ok(Json(LoggingConfigResponse {
        filter: config.get_filter(),
    }))
}
