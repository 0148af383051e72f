//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderValue, Uri};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::jwt::JwtService;
use crate::api::routes;
use crate::database::DbPool;
use crate::database::repositories::StreamSettingsRepository;
use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use crate::supervisor::StreamSupervisor;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Allowed CORS origins. `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl ApiServerConfig {
    fn cors_layer(&self) -> CorsLayer {
        let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        if self.allowed_origins.iter().any(|o| o == "*") {
            return cors.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Stream conversion supervisor
    pub supervisor: Arc<StreamSupervisor>,
    /// JWT service. Protected routes answer 401 when absent.
    pub jwt_service: Option<Arc<JwtService>>,
    pub settings_repository: Option<Arc<dyn StreamSettingsRepository>>,
    /// Pool used by the health check
    pub db_pool: Option<DbPool>,
    /// Logging configuration for dynamic log level changes
    pub logging_config: Option<Arc<LoggingConfig>>,
    /// First line of `ffmpeg -version`, if the binary was found
    pub transcoder_version: Option<String>,
}

impl AppState {
    pub fn new(supervisor: Arc<StreamSupervisor>) -> Self {
        Self {
            start_time: Instant::now(),
            supervisor,
            jwt_service: None,
            settings_repository: None,
            db_pool: None,
            logging_config: None,
            transcoder_version: None,
        }
    }

    pub fn with_jwt_service(mut self, jwt_service: Arc<JwtService>) -> Self {
        self.jwt_service = Some(jwt_service);
        self
    }

    pub fn with_settings_repository(mut self, repo: Arc<dyn StreamSettingsRepository>) -> Self {
        self.settings_repository = Some(repo);
        self
    }

    pub fn with_db_pool(mut self, pool: DbPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    pub fn with_logging_config(mut self, config: Arc<LoggingConfig>) -> Self {
        self.logging_config = Some(config);
        self
    }

    pub fn with_transcoder_version(mut self, version: Option<String>) -> Self {
        self.transcoder_version = version;
        self
    }
}

/// Request target for logging, with any `token` query value masked.
fn redacted_uri(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.path().to_string();
    };
    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("token", _)) => "token=***",
            _ => pair,
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", uri.path(), query)
}

fn is_health_path(req: &Request) -> bool {
    req.uri().path().starts_with("/api/health")
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            state,
            cancel_token,
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone())
            .layer(self.config.cors_layer())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request| {
                        if is_health_path(req) {
                            Span::none()
                        } else {
                            tracing::info_span!(
                                "request",
                                method = %req.method(),
                                uri = %redacted_uri(req.uri()),
                                version = ?req.version(),
                            )
                        }
                    })
                    .on_request(|req: &Request, span: &Span| {
                        if span.is_disabled() || is_health_path(req) {
                            return;
                        }
                        use tower_http::trace::OnRequest;
                        tower_http::trace::DefaultOnRequest::new()
                            .level(tracing::Level::INFO)
                            .on_request(req, span);
                    })
                    .on_response(
                        |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                            if span.is_disabled() {
                                return;
                            }
                            use tower_http::trace::OnResponse;
                            tower_http::trace::DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .on_response(res, latency, span);
                        },
                    )
                    .on_failure(
                        |class: tower_http::classify::ServerErrorsFailureClass,
                         latency: Duration,
                         span: &Span| {
                            if span.is_disabled() {
                                return;
                            }
                            use tower_http::trace::OnFailure;
                            tower_http::trace::DefaultOnFailure::new()
                                .level(tracing::Level::ERROR)
                                .on_failure(class, latency, span);
                        },
                    ),
            )
    }

    /// Serve until the cancel token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::ApiError(format!("Invalid address: {e}")))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::ApiError(format!("Failed to bind {addr}: {e}")))?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::ApiError(format!("Server error: {e}")))?;

        Ok(())
    }
}
