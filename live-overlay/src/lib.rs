//! live-overlay: overlay editor backend with on-demand RTSP to HLS conversion.
//!
//! The [`supervisor`] module runs one ffmpeg process per stream and serves its
//! HLS output. [`api`] exposes it over HTTP to authenticated owners, whose
//! stream settings live in [`database`].

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod supervisor;

pub use error::{Error, Result};
