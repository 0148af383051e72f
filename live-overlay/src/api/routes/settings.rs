//! Stream settings routes for the calling owner.

use axum::{Extension, Json, Router, extract::State, routing::get};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::jwt::Claims;
use crate::api::models::{StreamSettingsResponse, UpdateStreamSettingsRequest};
use crate::api::server::AppState;
use crate::database::repositories::StreamSettingsRepository;
use crate::supervisor::StreamId;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(get_settings).put(update_settings).post(update_settings),
    )
}

fn repository(state: &AppState) -> ApiResult<&dyn StreamSettingsRepository> {
    state
        .settings_repository
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Stream settings storage not available"))
}

/// The caller's stream settings.
#[utoipa::path(
    get,
    path = "/api/stream/settings",
    tag = "settings",
    responses(
        (status = 200, description = "Stream settings", body = StreamSettingsResponse),
        (status = 404, description = "No settings saved yet", body = crate::api::error::ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<StreamSettingsResponse>> {
    let settings = repository(&state)?
        .find_by_owner(claims.owner_id())
        .await?
        .ok_or_else(|| ApiError::not_found("No stream settings saved"))?;
    Ok(Json(settings.into()))
}

/// Save the caller's RTSP source. A live stream with a different source is
/// stopped so the next manifest request starts the new one.
#[utoipa::path(
    put,
    path = "/api/stream/settings",
    tag = "settings",
    request_body = UpdateStreamSettingsRequest,
    responses(
        (status = 200, description = "Settings saved", body = StreamSettingsResponse),
        (status = 422, description = "Empty RTSP URL", body = crate::api::error::ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<UpdateStreamSettingsRequest>,
) -> ApiResult<Json<StreamSettingsResponse>> {
    let rtsp_url = request.rtsp_url.trim();
    if rtsp_url.is_empty() {
        return Err(ApiError::validation("rtsp_url must not be empty"));
    }

    let settings = repository(&state)?.upsert(claims.owner_id(), rtsp_url).await?;
    info!(stream_id = settings.id, "Stream settings updated");

    let restarted = match StreamId::new(settings.id) {
        Ok(stream_id) => {
            state
                .supervisor
                .restart_if_source_changed(stream_id, &settings.rtsp_url)
                .await
        }
        Err(_) => false,
    };

    let mut response = StreamSettingsResponse::from(settings);
    response.restarted = restarted;
    Ok(Json(response))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use crate::api::jwt::JwtService;
    use crate::api::routes::create_router;
    use crate::database::repositories::SqlxStreamSettingsRepository;
    use crate::database::{init_pool_with_size, run_migrations};
    use crate::supervisor::test_support::{FakeLauncher, FakeMode};
    use crate::supervisor::{StreamSupervisor, SupervisorConfig};

    async fn app(dir: &std::path::Path) -> (Router, Arc<JwtService>, Arc<StreamSupervisor>) {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let supervisor = Arc::new(StreamSupervisor::new(
            SupervisorConfig {
                output_dir: dir.to_path_buf(),
                ready_poll_interval: Duration::from_millis(20),
                stop_grace: Duration::from_millis(200),
                ..SupervisorConfig::default()
            },
            Arc::new(FakeLauncher::new(dir, FakeMode::Healthy)),
        ));
        let jwt = Arc::new(JwtService::new(
            "test-secret-key-32-chars-long!!",
            "live-overlay",
            "live-overlay-api",
            None,
        ));
        let state = AppState::new(supervisor.clone())
            .with_jwt_service(jwt.clone())
            .with_settings_repository(Arc::new(SqlxStreamSettingsRepository::new(pool)));
        (create_router(state), jwt, supervisor)
    }

    async fn call(
        router: &Router,
        jwt: &JwtService,
        method: &str,
        uri: &str,
        owner: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let token = jwt.generate_token(owner, vec![]).unwrap();
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn settings_are_scoped_per_owner() {
        let dir = tempfile::tempdir().unwrap();
        let (router, jwt, _) = app(dir.path()).await;

        let (status, _) = call(&router, &jwt, "GET", "/api/stream/settings", "alice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let body = serde_json::json!({ "rtsp_url": "rtsp://cam/1" });
        let (status, alice) =
            call(&router, &jwt, "PUT", "/api/stream/settings", "alice", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(alice["rtsp_url"], "rtsp://cam/1");
        assert_eq!(
            alice["hls_url"],
            format!("/api/stream/hls/{}", alice["id"])
        );

        let body = serde_json::json!({ "rtsp_url": "rtsp://cam/2" });
        let (status, bob) =
            call(&router, &jwt, "POST", "/api/stream/settings", "bob", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(alice["id"], bob["id"]);

        let (_, fetched) = call(&router, &jwt, "GET", "/api/stream/settings", "alice", None).await;
        assert_eq!(fetched["rtsp_url"], "rtsp://cam/1");
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (router, jwt, _) = app(dir.path()).await;

        let body = serde_json::json!({ "rtsp_url": "   " });
        let (status, error) =
            call(&router, &jwt, "PUT", "/api/stream/settings", "alice", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn changing_source_restarts_live_stream() {
        let dir = tempfile::tempdir().unwrap();
        let (router, jwt, supervisor) = app(dir.path()).await;

        let body = serde_json::json!({ "rtsp_url": "rtsp://cam/1" });
        let (_, settings) =
            call(&router, &jwt, "PUT", "/api/stream/settings", "alice", Some(body)).await;
        let id = settings["id"].as_i64().unwrap();

        let uri = format!("/api/stream/hls/{id}");
        let (status, _) = call(&router, &jwt, "GET", &uri, "alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(supervisor.active_streams(), 1);

        let body = serde_json::json!({ "rtsp_url": "rtsp://cam/1" });
        let (_, same) = call(&router, &jwt, "PUT", "/api/stream/settings", "alice", Some(body)).await;
        assert_eq!(same["restarted"], false);
        assert_eq!(supervisor.active_streams(), 1);

        let body = serde_json::json!({ "rtsp_url": "rtsp://cam/9" });
        let (_, changed) =
            call(&router, &jwt, "PUT", "/api/stream/settings", "alice", Some(body)).await;
        assert_eq!(changed["restarted"], true);
        assert_eq!(supervisor.active_streams(), 0);
    }
}
