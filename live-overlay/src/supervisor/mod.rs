//! On-demand RTSP to HLS stream conversion.
//!
//! [`StreamSupervisor`] owns one transcoder process per stream. The first
//! manifest request for a stream launches it, later requests are served from
//! its output directory, and a stop terminates the process and removes its
//! files.

pub mod controller;
pub mod error;
pub mod job;
pub mod launcher;
pub mod manifest;
pub mod paths;
pub mod process;
pub mod registry;
pub mod segments;

#[cfg(all(test, unix))]
pub(crate) mod test_support;

pub use controller::{StreamState, StreamStatus, StreamSupervisor, SupervisorConfig};
pub use error::StreamError;
pub use job::StreamJob;
pub use launcher::{FfmpegLauncher, Launcher, TranscoderConfig};
pub use manifest::ManifestRewriter;
pub use paths::{OutputLayout, SourceUri, StreamId, StreamPaths};
pub use registry::{RegistryEntry, StopClaim, StreamRegistry};
pub use segments::{SEGMENT_CACHE_CONTROL, SEGMENT_CONTENT_TYPE, SegmentFile, SegmentServer};
