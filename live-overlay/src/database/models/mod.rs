//! Database models.

pub mod stream_settings;

pub use stream_settings::StreamSettingsDbModel;
