//! Stream lifecycle orchestration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use super::error::StreamError;
use super::job::StreamJob;
use super::launcher::{FfmpegLauncher, Launcher, TranscoderConfig};
use super::manifest::{DEFAULT_DELIVERY_PREFIX, ManifestRewriter};
use super::paths::{OutputLayout, SourceUri, StreamId};
use super::process::ProcessState;
use super::registry::{RegistryEntry, StopClaim, StreamRegistry};
use super::segments::{SegmentFile, SegmentServer};

/// Upper bound for flushing stderr after a crash.
const DRAIN_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Supervisor timing and output settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Shared output directory for all streams.
    pub output_dir: PathBuf,
    /// Route prefix written into delivered manifests.
    pub delivery_prefix: String,
    /// How long a first manifest request waits for output.
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
    /// Time given to the transcoder to quit before it is killed.
    pub stop_grace: Duration,
    /// Stop streams nobody has requested for this long. Disabled when `None`.
    pub idle_timeout: Option<Duration>,
    pub idle_sweep_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("hls_output"),
            delivery_prefix: DEFAULT_DELIVERY_PREFIX.to_string(),
            ready_timeout: Duration::from_secs(5),
            ready_poll_interval: Duration::from_millis(250),
            stop_grace: Duration::from_secs(5),
            idle_timeout: None,
            idle_sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Lifecycle state reported by [`StreamSupervisor::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Idle,
    Starting,
    Live,
    Exited,
    Stopping,
}

/// Read-only liveness snapshot of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StreamStatus {
    pub state: StreamState,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl StreamStatus {
    fn idle() -> Self {
        Self {
            state: StreamState::Idle,
            running: false,
            started_at: None,
        }
    }
}

/// Launches, tracks, serves and tears down per-stream transcoders.
pub struct StreamSupervisor {
    config: SupervisorConfig,
    layout: OutputLayout,
    registry: StreamRegistry,
    launcher: Arc<dyn Launcher>,
    rewriter: ManifestRewriter,
    segments: SegmentServer,
}

impl StreamSupervisor {
    pub fn new(config: SupervisorConfig, launcher: Arc<dyn Launcher>) -> Self {
        let layout = OutputLayout::new(config.output_dir.clone());
        Self {
            rewriter: ManifestRewriter::new(config.delivery_prefix.clone()),
            segments: SegmentServer::new(layout.clone()),
            registry: StreamRegistry::new(),
            layout,
            launcher,
            config,
        }
    }

    /// Supervisor driving the ffmpeg binary.
    pub fn with_ffmpeg(config: SupervisorConfig, transcoder: TranscoderConfig) -> Self {
        let launcher = FfmpegLauncher::new(transcoder, OutputLayout::new(config.output_dir.clone()));
        Self::new(config, Arc::new(launcher))
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Number of registered streams, starting or live.
    pub fn active_streams(&self) -> usize {
        self.registry.len()
    }

    /// Return the delivery manifest of `stream_id`, launching the conversion
    /// on first request.
    pub async fn get_manifest(
        &self,
        stream_id: StreamId,
        source: &str,
    ) -> Result<String, StreamError> {
        let source = SourceUri::parse(source)?;

        let job = match self.registry.get(stream_id) {
            Some(RegistryEntry::Live(job)) => job,
            Some(RegistryEntry::Starting(_) | RegistryEntry::Stopping(_)) => {
                return Err(StreamError::NotReady);
            }
            None => {
                let job = self.start(stream_id, &source).await?;
                self.wait_until_ready(&job).await;
                job
            }
        };

        if !self.registry.is_current(&job) {
            debug!(stream_id = %stream_id, "Stream was replaced or stopped while waiting");
            return Err(StreamError::NotReady);
        }
        job.touch();

        let raw = match tokio::fs::read_to_string(&job.paths().manifest).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return match job.process().state().await {
                    ProcessState::Exited(exit_code) => Err(self.handle_exit(&job, exit_code).await),
                    ProcessState::Running => Err(StreamError::NotReady),
                };
            }
            Err(e) => return Err(StreamError::Io(e)),
        };

        if !self.registry.is_current(&job) {
            debug!(stream_id = %stream_id, "Stream was stopped while reading its manifest");
            return Err(StreamError::NotReady);
        }
        Ok(self.rewriter.rewrite(&raw, stream_id))
    }

    /// Open a segment of `stream_id` and mark the stream as accessed.
    pub async fn open_segment(
        &self,
        stream_id: StreamId,
        file_name: &str,
    ) -> Result<SegmentFile, StreamError> {
        if let Some(RegistryEntry::Live(job)) = self.registry.get(stream_id) {
            job.touch();
        }
        self.segments.serve(stream_id, file_name).await
    }

    /// Stop a stream and delete its artifacts. Returns whether it was
    /// registered.
    ///
    /// The id stays marked as stopping until its files are gone, so a
    /// concurrent manifest request cannot relaunch it in the meantime.
    pub async fn stop(&self, stream_id: StreamId) -> bool {
        match self.registry.begin_stop(stream_id) {
            StopClaim::Live(job, marker) => {
                self.terminate(&job).await;
                let removed = self.cleanup_artifacts(stream_id).await;
                self.registry.finish_stop(stream_id, marker);
                info!(stream_id = %stream_id, removed, "Stream stopped");
                true
            }
            StopClaim::Idle(marker) => {
                let removed = self.cleanup_artifacts(stream_id).await;
                self.registry.finish_stop(stream_id, marker);
                if removed > 0 {
                    info!(stream_id = %stream_id, removed, "Removed orphaned stream artifacts");
                }
                false
            }
            StopClaim::Launching => {
                info!(stream_id = %stream_id, "Stop requested while stream was launching");
                true
            }
            StopClaim::AlreadyStopping => {
                debug!(stream_id = %stream_id, "Stream is already stopping");
                false
            }
        }
    }

    /// Report the lifecycle state of `stream_id` without changing it.
    pub async fn status(&self, stream_id: StreamId) -> StreamStatus {
        match self.registry.get(stream_id) {
            None => StreamStatus::idle(),
            Some(RegistryEntry::Starting(_)) => StreamStatus {
                state: StreamState::Starting,
                running: false,
                started_at: None,
            },
            Some(RegistryEntry::Stopping(_)) => StreamStatus {
                state: StreamState::Stopping,
                running: false,
                started_at: None,
            },
            Some(RegistryEntry::Live(job)) => {
                let running = !job.process().state().await.is_exited();
                StreamStatus {
                    state: if running {
                        StreamState::Live
                    } else {
                        StreamState::Exited
                    },
                    running,
                    started_at: Some(job.started_at()),
                }
            }
        }
    }

    /// Stop the live stream if it converts a different source than
    /// `new_source`. Returns whether it was stopped.
    pub async fn restart_if_source_changed(&self, stream_id: StreamId, new_source: &str) -> bool {
        match self.registry.get(stream_id) {
            Some(RegistryEntry::Live(job)) if job.source().as_str() != new_source => {
                info!(stream_id = %stream_id, "Source changed, stopping current conversion");
                self.stop(stream_id).await
            }
            _ => false,
        }
    }

    /// Stop every live stream idle for longer than the configured timeout.
    pub async fn sweep_idle(&self) -> Vec<StreamId> {
        let Some(timeout) = self.config.idle_timeout else {
            return Vec::new();
        };

        let now_ms = Utc::now().timestamp_millis();
        let mut stopped = Vec::new();
        for job in self.registry.live_jobs() {
            if job.idle_for(now_ms) < timeout {
                continue;
            }
            let stream_id = job.stream_id();
            let Some(marker) = self.registry.detach_job(stream_id, &job) else {
                continue;
            };
            info!(
                stream_id = %stream_id,
                idle_secs = job.idle_for(now_ms).as_secs(),
                "Stopping idle stream"
            );
            self.terminate(&job).await;
            self.cleanup_artifacts(stream_id).await;
            self.registry.finish_stop(stream_id, marker);
            stopped.push(stream_id);
        }
        stopped
    }

    /// Run [`Self::sweep_idle`] periodically until `cancel` fires.
    ///
    /// Returns `None` when no idle timeout is configured.
    pub fn spawn_idle_reaper(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let timeout = self.config.idle_timeout?;
        let period = self.config.idle_sweep_interval.min(timeout).max(Duration::from_millis(10));
        let supervisor = Arc::clone(self);

        info!(
            timeout_secs = timeout.as_secs(),
            period_ms = period.as_millis() as u64,
            "Idle stream reaper started"
        );
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let stopped = supervisor.sweep_idle().await;
                        if !stopped.is_empty() {
                            debug!(count = stopped.len(), "Idle sweep stopped streams");
                        }
                    }
                }
            }
            debug!("Idle stream reaper stopped");
        }))
    }

    /// Stop every registered stream.
    pub async fn shutdown(&self) {
        let entries = self.registry.drain();
        if entries.is_empty() {
            return;
        }
        info!(count = entries.len(), "Stopping all streams");

        join_all(entries.into_iter().map(|(stream_id, entry)| async move {
            if let RegistryEntry::Live(job) = entry {
                self.terminate(&job).await;
            }
            self.cleanup_artifacts(stream_id).await;
        }))
        .await;
    }

    async fn start(
        &self,
        stream_id: StreamId,
        source: &SourceUri,
    ) -> Result<Arc<StreamJob>, StreamError> {
        let Some(reservation) = self.registry.reserve(stream_id) else {
            debug!(stream_id = %stream_id, "Another request is launching this stream");
            return Err(StreamError::NotReady);
        };

        info!(stream_id = %stream_id, source = %source.redacted(), "Starting stream conversion");
        let job = match self.launcher.launch(source, stream_id).await {
            Ok(job) => Arc::new(job),
            Err(e) => {
                self.registry.release(stream_id, reservation);
                error!(stream_id = %stream_id, error = %e, "Stream launch failed");
                return Err(e);
            }
        };

        if !self.registry.promote(stream_id, reservation, job.clone()) {
            warn!(stream_id = %stream_id, "Stream was stopped during launch, discarding process");
            self.terminate(&job).await;
            self.cleanup_artifacts(stream_id).await;
            self.registry.finish_stop(stream_id, reservation);
            return Err(StreamError::NotReady);
        }
        Ok(job)
    }

    /// Poll until the manifest appears, the process exits or the timeout
    /// elapses.
    async fn wait_until_ready(&self, job: &StreamJob) {
        let deadline = Instant::now() + self.config.ready_timeout;
        loop {
            if tokio::fs::try_exists(&job.paths().manifest)
                .await
                .unwrap_or(false)
            {
                return;
            }
            if job.process().state().await.is_exited() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(stream_id = %job.stream_id(), "Manifest not ready within timeout");
                return;
            }
            tokio::time::sleep(self.config.ready_poll_interval.min(deadline - now)).await;
        }
    }

    /// Deregister a job that exited without output and build the crash
    /// report. A job that is no longer current was stopped, not crashed.
    async fn handle_exit(&self, job: &Arc<StreamJob>, exit_code: Option<i32>) -> StreamError {
        let stream_id = job.stream_id();
        let Some(marker) = self.registry.detach_job(stream_id, job) else {
            return StreamError::NotReady;
        };

        job.process().finish_drain(DRAIN_FLUSH_TIMEOUT).await;
        let diagnostics = job.process().diagnostics();
        error!(
            stream_id = %stream_id,
            exit_code = ?exit_code,
            diagnostics = %diagnostics,
            "Stream conversion exited"
        );
        self.cleanup_artifacts(stream_id).await;
        self.registry.finish_stop(stream_id, marker);

        StreamError::ConversionCrashed {
            exit_code,
            diagnostics,
        }
    }

    async fn terminate(&self, job: &StreamJob) {
        match job.process().terminate(self.config.stop_grace).await {
            Ok(termination) => debug!(
                stream_id = %job.stream_id(),
                ?termination,
                "Transcoder terminated"
            ),
            Err(e) => warn!(
                stream_id = %job.stream_id(),
                error = %e,
                "Failed to terminate transcoder"
            ),
        }
    }

    /// Delete every artifact of `stream_id`. Failures are logged only.
    async fn cleanup_artifacts(&self, stream_id: StreamId) -> usize {
        let root = self.layout.root();
        let mut dir = match tokio::fs::read_dir(root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %root.display(), error = %e, "Failed to list output directory");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %root.display(), error = %e, "Failed to read output directory");
                    break;
                }
            };
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !OutputLayout::is_artifact(stream_id, name) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = %name, error = %e, "Failed to delete stream artifact"),
            }
        }
        removed
    }
}
