//! Launcher stand-in that runs harmless shell processes instead of ffmpeg.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::StreamError;
use super::job::StreamJob;
use super::launcher::Launcher;
use super::paths::{OutputLayout, SourceUri, StreamId};
use super::process::TranscodeProcess;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMode {
    /// Long-running process that has already written a manifest and a segment.
    Healthy,
    /// Long-running process that never writes anything.
    NoOutput,
    /// Prints an error and exits with code 1.
    Crash,
    /// The binary does not exist.
    FailToSpawn,
}

pub struct FakeLauncher {
    layout: OutputLayout,
    mode: FakeMode,
    launch_delay: Duration,
    launches: AtomicUsize,
    last_pid: Mutex<Option<u32>>,
}

impl FakeLauncher {
    pub fn new(dir: &Path, mode: FakeMode) -> Self {
        Self {
            layout: OutputLayout::new(dir),
            mode,
            launch_delay: Duration::ZERO,
            launches: AtomicUsize::new(0),
            last_pid: Mutex::new(None),
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Number of launch attempts, failed ones included.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn last_pid(&self) -> Option<u32> {
        *self.last_pid.lock()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(
        &self,
        source: &SourceUri,
        stream_id: StreamId,
    ) -> Result<StreamJob, StreamError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }

        let mut command = match self.mode {
            FakeMode::Healthy | FakeMode::NoOutput => {
                let mut command = process_utils::tokio_command("sleep");
                command.arg("30");
                command
            }
            FakeMode::Crash => {
                let mut command = process_utils::tokio_command("sh");
                command
                    .arg("-c")
                    .arg("echo 'rtsp://cam: Connection refused' >&2; exit 1");
                command
            }
            FakeMode::FailToSpawn => process_utils::tokio_command("/nonexistent/fake-ffmpeg"),
        };
        command.current_dir(self.layout.root());

        let process = TranscodeProcess::spawn(command, stream_id)
            .map_err(|e| StreamError::LaunchFailed(e.to_string()))?;
        *self.last_pid.lock() = process.pid();

        let paths = self.layout.paths(stream_id);
        if self.mode == FakeMode::Healthy {
            let manifest = format!(
                "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:0\n\
                 #EXTINF:2.000000,\nstream_{stream_id}_000.ts\n"
            );
            std::fs::write(&paths.manifest, manifest)?;
            std::fs::write(
                self.layout.root().join(format!("stream_{stream_id}_000.ts")),
                b"\x47fake-transport-stream",
            )?;
        }

        Ok(StreamJob::new(stream_id, source.clone(), paths, process))
    }
}

/// Write a full set of artifacts for `stream_id` into `dir`.
pub fn seed_artifacts(dir: &Path, stream_id: i64) {
    for name in [
        format!("stream_{stream_id}.m3u8"),
        format!("stream_{stream_id}.m3u8.tmp"),
        format!("stream_{stream_id}_000.ts"),
        format!("stream_{stream_id}_001.ts"),
    ] {
        std::fs::write(dir.join(name), b"x").unwrap();
    }
}
