//! Repository layer for database access.

pub mod stream_settings;

pub use stream_settings::*;
