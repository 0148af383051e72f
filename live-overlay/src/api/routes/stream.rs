//! Stream delivery routes: manifest, segments, stop and status.

use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
    routing::{get, post},
};
use tokio_util::io::ReaderStream;

use crate::api::error::{ApiError, ApiResult};
use crate::api::jwt::Claims;
use crate::api::models::StopStreamResponse;
use crate::api::server::AppState;
use crate::database::models::StreamSettingsDbModel;
use crate::supervisor::{SEGMENT_CACHE_CONTROL, SEGMENT_CONTENT_TYPE, StreamId, StreamStatus};

pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/hls/{id}", get(get_manifest))
        .route("/hls/{id}/{filename}", get(get_segment))
        .route("/stop/{id}", post(stop_stream))
        .route("/status/{id}", get(stream_status))
}

/// Resolve `id` to a stream owned by the caller. Unowned ids are not found.
async fn owned_stream(
    state: &AppState,
    claims: &Claims,
    id: i64,
) -> ApiResult<(StreamId, StreamSettingsDbModel)> {
    let repo = state
        .settings_repository
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Stream settings storage not available"))?;

    let settings = repo
        .find_for_owner(claims.owner_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Stream {id} not found")))?;
    let stream_id = StreamId::new(settings.id)?;
    Ok((stream_id, settings))
}

/// Live HLS manifest. Starts the conversion on first request.
#[utoipa::path(
    get,
    path = "/api/stream/hls/{id}",
    tag = "stream",
    params(("id" = i64, Path, description = "Stream id")),
    responses(
        (status = 200, description = "Rewritten manifest", content_type = "application/vnd.apple.mpegurl", body = String),
        (status = 400, description = "Invalid RTSP source", body = crate::api::error::ApiErrorResponse),
        (status = 404, description = "Unknown stream", body = crate::api::error::ApiErrorResponse),
        (status = 500, description = "Launch failed or conversion crashed", body = crate::api::error::ApiErrorResponse),
        (status = 503, description = "Output not ready, retry", body = crate::api::error::ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_manifest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let (stream_id, settings) = owned_stream(&state, &claims, id).await?;
    let manifest = state
        .supervisor
        .get_manifest(stream_id, &settings.rtsp_url)
        .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, MANIFEST_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(Body::from(manifest))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))
}

/// One media segment of a stream.
#[utoipa::path(
    get,
    path = "/api/stream/hls/{id}/{filename}",
    tag = "stream",
    params(
        ("id" = i64, Path, description = "Stream id"),
        ("filename" = String, Path, description = "Segment file name, e.g. stream_7_000.ts")
    ),
    responses(
        (status = 200, description = "Segment data", content_type = "video/mp2t", body = Vec<u8>),
        (status = 404, description = "Unknown stream or segment", body = crate::api::error::ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_segment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, filename)): Path<(i64, String)>,
) -> ApiResult<Response> {
    let (stream_id, _) = owned_stream(&state, &claims, id).await?;
    let segment = state.supervisor.open_segment(stream_id, &filename).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, SEGMENT_CACHE_CONTROL)
        .header(header::CONTENT_LENGTH, segment.len)
        .body(Body::from_stream(ReaderStream::new(segment.file)))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))
}

/// Stop the conversion and delete its output.
#[utoipa::path(
    post,
    path = "/api/stream/stop/{id}",
    tag = "stream",
    params(("id" = i64, Path, description = "Stream id")),
    responses(
        (status = 200, description = "Stream stopped", body = StopStreamResponse),
        (status = 404, description = "Unknown stream", body = crate::api::error::ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn stop_stream(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> ApiResult<Json<StopStreamResponse>> {
    let (stream_id, _) = owned_stream(&state, &claims, id).await?;
    let was_running = state.supervisor.stop(stream_id).await;

    let message = if was_running {
        "Stream stopped"
    } else {
        "Stream was not running"
    };
    Ok(Json(StopStreamResponse {
        message: message.to_string(),
        was_running,
    }))
}

/// Lifecycle state of a stream.
#[utoipa::path(
    get,
    path = "/api/stream/status/{id}",
    tag = "stream",
    params(("id" = i64, Path, description = "Stream id")),
    responses(
        (status = 200, description = "Stream status", body = StreamStatus),
        (status = 404, description = "Unknown stream", body = crate::api::error::ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn stream_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> ApiResult<Json<StreamStatus>> {
    let (stream_id, _) = owned_stream(&state, &claims, id).await?;
    Ok(Json(state.supervisor.status(stream_id).await))
}
