//! A running transcoder process and its diagnostic output.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use process_utils::{Termination, terminate_child};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::paths::StreamId;

/// Number of stderr lines kept for crash reports.
pub const DIAGNOSTIC_LINES: usize = 64;

/// ffmpeg quits cleanly when it reads `q` on stdin.
const QUIT_COMMAND: &[u8] = b"q";

/// Bounded ring of the most recent diagnostic lines.
#[derive(Debug)]
pub struct DiagnosticBuffer {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl DiagnosticBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Buffered lines joined with newlines, oldest first.
    pub fn joined(&self) -> String {
        self.snapshot().join("\n")
    }
}

/// Observed state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(Option<i32>),
}

impl ProcessState {
    pub fn is_exited(&self) -> bool {
        matches!(self, Self::Exited(_))
    }
}

/// Owned transcoder child process.
///
/// Stderr is drained for the whole process lifetime so the child never blocks
/// on a full pipe. The child is killed if this value is dropped.
pub struct TranscodeProcess {
    stream_id: StreamId,
    pid: Option<u32>,
    child: tokio::sync::Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    diagnostics: Arc<DiagnosticBuffer>,
    drain_cancel: CancellationToken,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl TranscodeProcess {
    /// Spawn `command` with piped stdin/stderr and start draining stderr.
    pub fn spawn(mut command: Command, stream_id: StreamId) -> std::io::Result<Self> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let pid = child.id();
        let stdin = child.stdin.take();
        let stderr = child.stderr.take();

        let diagnostics = Arc::new(DiagnosticBuffer::new(DIAGNOSTIC_LINES));
        let drain_cancel = CancellationToken::new();
        let drain = stderr.map(|stderr| {
            tokio::spawn(drain_diagnostics(
                stderr,
                diagnostics.clone(),
                drain_cancel.clone(),
                stream_id,
            ))
        });

        Ok(Self {
            stream_id,
            pid,
            child: tokio::sync::Mutex::new(child),
            stdin: Mutex::new(stdin),
            diagnostics,
            drain_cancel,
            drain: Mutex::new(drain),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Poll the child without blocking.
    pub async fn state(&self) -> ProcessState {
        let mut child = self.child.lock().await;
        match child.try_wait() {
            Ok(Some(status)) => ProcessState::Exited(status.code()),
            Ok(None) => ProcessState::Running,
            Err(e) => {
                warn!(stream_id = %self.stream_id, error = %e, "Failed to poll transcoder process");
                ProcessState::Exited(None)
            }
        }
    }

    /// Request a graceful quit, kill after `grace`, then flush the drain task.
    pub async fn terminate(&self, grace: Duration) -> std::io::Result<Termination> {
        let stdin = self.stdin.lock().take();
        let result = {
            let mut child = self.child.lock().await;
            terminate_child(&mut child, stdin, QUIT_COMMAND, grace).await
        };
        self.finish_drain(grace).await;
        result
    }

    /// Wait for the stderr drain to reach EOF, cancelling it after `timeout`.
    pub async fn finish_drain(&self, timeout: Duration) {
        let handle = self.drain.lock().take();
        let Some(mut handle) = handle else {
            return;
        };
        if tokio::time::timeout(timeout, &mut handle).await.is_err() {
            debug!(stream_id = %self.stream_id, "Diagnostic drain still open, cancelling");
            self.drain_cancel.cancel();
            let _ = handle.await;
        }
    }

    pub fn diagnostics(&self) -> String {
        self.diagnostics.joined()
    }
}

impl Drop for TranscodeProcess {
    fn drop(&mut self) {
        self.drain_cancel.cancel();
    }
}

async fn drain_diagnostics(
    stderr: ChildStderr,
    diagnostics: Arc<DiagnosticBuffer>,
    cancel: CancellationToken,
    stream_id: StreamId,
) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                // ffmpeg may print non-UTF-8 metadata.
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                if line.to_ascii_lowercase().contains("error") {
                    warn!(target: "live_overlay::ffmpeg", stream_id = %stream_id, "{line}");
                } else {
                    debug!(target: "live_overlay::ffmpeg", stream_id = %stream_id, "{line}");
                }
                diagnostics.push(line.to_string());
            }
            Err(e) => {
                warn!(stream_id = %stream_id, error = %e, "Failed to read transcoder stderr");
                break;
            }
        }
    }
    debug!(stream_id = %stream_id, "Diagnostic drain finished");
}
