//! Process configuration loaded from environment variables.
//!
//! Every setting has a default so the service starts with an empty
//! environment. `.env` files are honored through `dotenvy` in `main`.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::api::server::ApiServerConfig;
use crate::supervisor::{SupervisorConfig, TranscoderConfig};
use crate::{Error, Result};

/// Default SQLite database location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:live-overlay.db?mode=rwc";

/// JWT validation settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret. Protected routes reject every request when unset.
    pub jwt_secret: Option<String>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_issuer: "live-overlay".to_string(),
            jwt_audience: "live-overlay-api".to_string(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ApiServerConfig,
    pub database_url: String,
    pub log_dir: PathBuf,
    pub transcoder: TranscoderConfig,
    pub supervisor: SupervisorConfig,
    pub auth: AuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ApiServerConfig::default(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_dir: PathBuf::from("logs"),
            transcoder: TranscoderConfig::default(),
            supervisor: SupervisorConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Supported keys:
    /// - `API_BIND_ADDRESS`, `API_PORT`, `ALLOWED_ORIGINS`
    /// - `DATABASE_URL`, `LOG_DIR`, `HLS_OUTPUT_DIR`
    /// - `FFMPEG_PATH`, `FFMPEG_LOG_LEVEL`, `HLS_SEGMENT_SECS`, `HLS_LIST_SIZE`
    /// - `STREAM_READY_TIMEOUT_MS`, `STREAM_READY_POLL_MS`, `STREAM_STOP_GRACE_MS`,
    ///   `IDLE_TIMEOUT_SECS`
    /// - `JWT_SECRET`, `JWT_ISSUER`, `JWT_AUDIENCE`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            config.server.bind_address = bind_address;
        }
        if let Some(port) = parse(&get, "API_PORT")? {
            config.server.port = port;
        }
        if let Some(origins) = get("ALLOWED_ORIGINS") {
            config.server.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if let Some(dir) = get("HLS_OUTPUT_DIR") {
            config.supervisor.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = get("FFMPEG_PATH") {
            config.transcoder.binary_path = path;
        }
        if let Some(level) = get("FFMPEG_LOG_LEVEL") {
            config.transcoder.log_level = level;
        }
        if let Some(secs) = parse::<u32>(&get, "HLS_SEGMENT_SECS")? {
            if secs == 0 {
                return Err(Error::config("HLS_SEGMENT_SECS must be greater than zero"));
            }
            config.transcoder.segment_secs = secs;
        }
        if let Some(size) = parse(&get, "HLS_LIST_SIZE")? {
            config.transcoder.playlist_size = size;
        }

        if let Some(ms) = parse(&get, "STREAM_READY_TIMEOUT_MS")? {
            config.supervisor.ready_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&get, "STREAM_READY_POLL_MS")? {
            config.supervisor.ready_poll_interval = Duration::from_millis(ms.max(10));
        }
        if let Some(ms) = parse(&get, "STREAM_STOP_GRACE_MS")? {
            config.supervisor.stop_grace = Duration::from_millis(ms);
        }
        if let Some(secs) = parse::<u64>(&get, "IDLE_TIMEOUT_SECS")? {
            config.supervisor.idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.auth.jwt_secret = get("JWT_SECRET");
        if let Some(issuer) = get("JWT_ISSUER") {
            config.auth.jwt_issuer = issuer;
        }
        if let Some(audience) = get("JWT_AUDIENCE") {
            config.auth.jwt_audience = audience;
        }

        Ok(config)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| Error::config(format!("Invalid value for {key} ({raw:?}): {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.supervisor.output_dir, PathBuf::from("hls_output"));
        assert_eq!(config.supervisor.ready_timeout, Duration::from_secs(5));
        assert!(config.supervisor.idle_timeout.is_none());
        assert_eq!(config.transcoder.segment_secs, 2);
        assert_eq!(config.transcoder.playlist_size, 5);
        assert!(config.auth.jwt_secret.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup(&[
            ("API_PORT", "8080"),
            ("HLS_OUTPUT_DIR", "/var/lib/hls"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("IDLE_TIMEOUT_SECS", "600"),
            ("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.supervisor.output_dir, PathBuf::from("/var/lib/hls"));
        assert_eq!(
            config.server.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(
            config.supervisor.idle_timeout,
            Some(Duration::from_secs(600))
        );
        assert_eq!(config.transcoder.binary_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config =
            AppConfig::from_lookup(lookup(&[("API_PORT", "  "), ("JWT_SECRET", "")])).unwrap();

        assert_eq!(config.server.port, 5000);
        assert!(config.auth.jwt_secret.is_none());
    }

    #[test]
    fn invalid_numbers_are_configuration_errors() {
        let err = AppConfig::from_lookup(lookup(&[("API_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("API_PORT")));

        let err = AppConfig::from_lookup(lookup(&[("HLS_SEGMENT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn zero_idle_timeout_disables_reaper() {
        let config = AppConfig::from_lookup(lookup(&[("IDLE_TIMEOUT_SECS", "0")])).unwrap();
        assert!(config.supervisor.idle_timeout.is_none());
    }
}
