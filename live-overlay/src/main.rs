use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use live_overlay::api::jwt::JwtService;
use live_overlay::api::{ApiServer, AppState};
use live_overlay::config::AppConfig;
use live_overlay::database::repositories::SqlxStreamSettingsRepository;
use live_overlay::database::{init_pool, run_migrations};
use live_overlay::logging::init_logging;
use live_overlay::supervisor::{FfmpegLauncher, OutputLayout, StreamSupervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().context("loading configuration")?;
    let (logging_config, _log_guard) =
        init_logging(&config.log_dir).context("initializing logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        output_dir = %config.supervisor.output_dir.display(),
        "Starting live-overlay"
    );

    let pool = init_pool(&config.database_url)
        .await
        .context("opening database")?;
    run_migrations(&pool).await.context("running migrations")?;

    tokio::fs::create_dir_all(&config.supervisor.output_dir)
        .await
        .with_context(|| {
            format!(
                "creating HLS output directory {}",
                config.supervisor.output_dir.display()
            )
        })?;

    let launcher = FfmpegLauncher::new(
        config.transcoder.clone(),
        OutputLayout::new(config.supervisor.output_dir.clone()),
    );
    let transcoder_version = launcher.detect_version();
    match &transcoder_version {
        Some(version) => info!(version = %version, "Found ffmpeg"),
        None => warn!(
            binary = %config.transcoder.binary_path,
            "ffmpeg not found, stream conversion will fail until it is installed"
        ),
    }
    let supervisor = Arc::new(StreamSupervisor::new(
        config.supervisor.clone(),
        Arc::new(launcher),
    ));

    let mut state = AppState::new(supervisor.clone())
        .with_settings_repository(Arc::new(SqlxStreamSettingsRepository::new(pool.clone())))
        .with_db_pool(pool)
        .with_logging_config(logging_config.clone())
        .with_transcoder_version(transcoder_version);
    match JwtService::from_config(&config.auth) {
        Some(jwt) => state = state.with_jwt_service(Arc::new(jwt)),
        None => warn!("JWT_SECRET is not set, all stream routes will answer 401"),
    }

    let cancel = CancellationToken::new();
    logging_config.start_retention_cleanup(cancel.child_token());
    let reaper = supervisor.spawn_idle_reaper(cancel.child_token());

    let server = ApiServer::new(config.server.clone(), state, cancel.clone());
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    let result = server.run().await;
    cancel.cancel();

    if let Some(reaper) = reaper {
        let _ = reaper.await;
    }
    supervisor.shutdown().await;
    info!("Shutdown complete");

    result.context("running API server")
}
