//! A tracked live conversion.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::paths::{SourceUri, StreamId, StreamPaths};
use super::process::TranscodeProcess;

/// One running conversion: the transcoder process plus what it writes.
pub struct StreamJob {
    stream_id: StreamId,
    source: SourceUri,
    paths: StreamPaths,
    process: TranscodeProcess,
    started_at: DateTime<Utc>,
    last_access_ms: AtomicI64,
}

impl StreamJob {
    pub fn new(
        stream_id: StreamId,
        source: SourceUri,
        paths: StreamPaths,
        process: TranscodeProcess,
    ) -> Self {
        let started_at = Utc::now();
        Self {
            stream_id,
            source,
            paths,
            process,
            started_at,
            last_access_ms: AtomicI64::new(started_at.timestamp_millis()),
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn source(&self) -> &SourceUri {
        &self.source
    }

    pub fn paths(&self) -> &StreamPaths {
        &self.paths
    }

    pub fn process(&self) -> &TranscodeProcess {
        &self.process
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record a client access.
    pub fn touch(&self) {
        self.last_access_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_access_ms(&self) -> i64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    /// Time since the last access, measured against `now_ms`.
    pub fn idle_for(&self, now_ms: i64) -> Duration {
        let idle = now_ms.saturating_sub(self.last_access_ms()).max(0);
        Duration::from_millis(idle as u64)
    }
}

impl std::fmt::Debug for StreamJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamJob")
            .field("stream_id", &self.stream_id)
            .field("source", &self.source)
            .field("pid", &self.process.pid())
            .field("started_at", &self.started_at)
            .finish()
    }
}
