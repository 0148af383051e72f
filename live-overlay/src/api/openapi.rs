//! OpenAPI document served at `/api/openapi.json`.

use utoipa::OpenApi;

use crate::api::error::ApiErrorResponse;
use crate::api::models::{
    ComponentHealth, HealthResponse, LivenessResponse, LoggingConfigResponse, StopStreamResponse,
    StreamSettingsResponse, UpdateLogFilterRequest, UpdateStreamSettingsRequest,
};
use crate::supervisor::{StreamState, StreamStatus};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "live-overlay API",
        description = "Overlay editor backend with on-demand RTSP to HLS stream conversion."
    ),
    tags(
        (name = "stream", description = "HLS delivery and stream lifecycle"),
        (name = "settings", description = "Per-owner stream settings"),
        (name = "logging", description = "Runtime log filter"),
        (name = "health", description = "Health probes")
    ),
    paths(
        crate::api::routes::stream::get_manifest,
        crate::api::routes::stream::get_segment,
        crate::api::routes::stream::stop_stream,
        crate::api::routes::stream::stream_status,
        crate::api::routes::settings::get_settings,
        crate::api::routes::settings::update_settings,
        crate::api::routes::logging::get_log_filter,
        crate::api::routes::logging::update_log_filter,
        crate::api::routes::health::health_check,
        crate::api::routes::health::liveness_check,
    ),
    components(schemas(
        ApiErrorResponse,
        HealthResponse,
        ComponentHealth,
        LivenessResponse,
        StopStreamResponse,
        StreamStatus,
        StreamState,
        StreamSettingsResponse,
        UpdateStreamSettingsRequest,
        LoggingConfigResponse,
        UpdateLogFilterRequest,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Bearer JWT security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
