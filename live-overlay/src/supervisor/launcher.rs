//! Transcoder launcher.

use async_trait::async_trait;
use tracing::{error, info};

use super::error::StreamError;
use super::job::StreamJob;
use super::paths::{OutputLayout, SourceUri, StreamId, StreamPaths};
use super::process::TranscodeProcess;

/// Settings for the ffmpeg RTSP to HLS conversion.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    /// Path to the ffmpeg binary.
    pub binary_path: String,
    /// ffmpeg `-loglevel` value.
    pub log_level: String,
    /// Target segment duration in seconds.
    pub segment_secs: u32,
    /// Number of segments kept in the live playlist.
    pub playlist_size: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            log_level: "warning".to_string(),
            segment_secs: 2,
            playlist_size: 5,
        }
    }
}

/// Starts one transcoder process per stream.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start converting `source` into the output files of `stream_id`.
    async fn launch(&self, source: &SourceUri, stream_id: StreamId)
    -> Result<StreamJob, StreamError>;
}

/// Launcher backed by the ffmpeg binary.
pub struct FfmpegLauncher {
    config: TranscoderConfig,
    layout: OutputLayout,
}

impl FfmpegLauncher {
    pub fn new(config: TranscoderConfig, layout: OutputLayout) -> Self {
        Self { config, layout }
    }

    /// First line of `ffmpeg -version`, or `None` when the binary is unusable.
    pub fn detect_version(&self) -> Option<String> {
        std::process::Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| {
                String::from_utf8(output.stdout)
                    .ok()
                    .and_then(|s| s.lines().next().map(|l| l.to_string()))
            })
    }

    /// Build ffmpeg arguments for one conversion.
    pub fn build_args(&self, source: &SourceUri, paths: &StreamPaths) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
        ];

        args.extend([
            "-rtsp_transport".to_string(),
            "tcp".to_string(),
            "-i".to_string(),
            source.as_str().to_string(),
        ]);

        args.extend(
            [
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-tune",
                "zerolatency",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
            ]
            .map(String::from),
        );

        args.extend([
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.config.segment_secs.to_string(),
            "-hls_list_size".to_string(),
            self.config.playlist_size.to_string(),
            "-hls_flags".to_string(),
            "delete_segments+append_list".to_string(),
            "-hls_segment_filename".to_string(),
            paths.segment_pattern.to_string_lossy().to_string(),
            "-start_number".to_string(),
            "0".to_string(),
            paths.manifest.to_string_lossy().to_string(),
        ]);

        args
    }
}

#[async_trait]
impl Launcher for FfmpegLauncher {
    async fn launch(
        &self,
        source: &SourceUri,
        stream_id: StreamId,
    ) -> Result<StreamJob, StreamError> {
        let paths = self.layout.paths(stream_id);

        tokio::fs::create_dir_all(self.layout.root())
            .await
            .map_err(|e| {
                StreamError::LaunchFailed(format!(
                    "cannot create output directory {}: {e}",
                    self.layout.root().display()
                ))
            })?;

        let mut command = process_utils::tokio_command(&self.config.binary_path);
        command.args(self.build_args(source, &paths));

        let process = TranscodeProcess::spawn(command, stream_id).map_err(|e| {
            error!(
                stream_id = %stream_id,
                binary = %self.config.binary_path,
                error = %e,
                "Failed to spawn ffmpeg"
            );
            StreamError::LaunchFailed(format!("{}: {e}", self.config.binary_path))
        })?;

        info!(
            stream_id = %stream_id,
            pid = ?process.pid(),
            source = %source.redacted(),
            manifest = %paths.manifest.display(),
            "Started ffmpeg"
        );

        Ok(StreamJob::new(stream_id, source.clone(), paths, process))
    }
}
