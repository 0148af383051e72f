//! Stream conversion error taxonomy.

use thiserror::Error;

/// Errors surfaced by the stream conversion supervisor.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The configured source is not a usable `rtsp://` URL. Not retried.
    #[error("Invalid RTSP source: {0}")]
    InvalidSource(String),

    /// The transcoder process could not be started. Not retried.
    #[error("Failed to start stream conversion: {0}")]
    LaunchFailed(String),

    /// The transcoder has not produced output yet. Retry after a short delay.
    #[error("Stream output is not ready yet")]
    NotReady,

    /// The transcoder exited. Carries the tail of its diagnostic output.
    #[error("Stream conversion exited{}", exit_suffix(.exit_code))]
    ConversionCrashed {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    /// Unknown stream or segment.
    #[error("{0} not found")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Whether the caller should retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady)
    }
}

fn exit_suffix(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!(" with code {code}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_message_includes_exit_code_when_known() {
        let err = StreamError::ConversionCrashed {
            exit_code: Some(1),
            diagnostics: String::new(),
        };
        assert_eq!(err.to_string(), "Stream conversion exited with code 1");

        let err = StreamError::ConversionCrashed {
            exit_code: None,
            diagnostics: String::new(),
        };
        assert_eq!(err.to_string(), "Stream conversion exited");
    }

    #[test]
    fn only_not_ready_is_retryable() {
        assert!(StreamError::NotReady.is_retryable());
        assert!(!StreamError::LaunchFailed("boom".into()).is_retryable());
        assert!(!StreamError::InvalidSource("http://x".into()).is_retryable());
    }
}
