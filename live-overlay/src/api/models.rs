//! API request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::database::models::StreamSettingsDbModel;
use crate::supervisor::manifest::DEFAULT_DELIVERY_PREFIX;

/// Health check response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
}

/// Health of one dependency.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Liveness check response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LivenessResponse {
    /// Always "alive" if responding
    pub status: String,
    pub uptime_secs: u64,
}

/// Result of a stop request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StopStreamResponse {
    pub message: String,
    /// Whether a conversion was registered for the stream.
    pub was_running: bool,
}

/// Stream settings update.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateStreamSettingsRequest {
    /// `rtsp://` source URL of the camera.
    pub rtsp_url: String,
}

/// The caller's stream settings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StreamSettingsResponse {
    /// Stream id used in all `/api/stream/*` routes.
    pub id: i64,
    pub rtsp_url: String,
    /// Manifest URL of this stream.
    pub hls_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether a live conversion was stopped because the source changed.
    #[serde(default)]
    pub restarted: bool,
}

impl From<StreamSettingsDbModel> for StreamSettingsResponse {
    fn from(model: StreamSettingsDbModel) -> Self {
        Self {
            hls_url: format!("{DEFAULT_DELIVERY_PREFIX}/{}", model.id),
            created_at: model.get_created_at(),
            updated_at: model.get_updated_at(),
            id: model.id,
            rtsp_url: model.rtsp_url,
            restarted: false,
        }
    }
}

/// Current log filter.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoggingConfigResponse {
    pub filter: String,
}

/// Log filter update.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateLogFilterRequest {
    /// `EnvFilter` directive, e.g. `live_overlay=debug,sqlx=warn`.
    pub filter: String,
}
