//! Server and configuration error types.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file (or merged result) is not valid JSON for the schema.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value was out of range.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Errors raised by the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A stream was requested while the server is shutting down.
    #[error("server is shutting down")]
    ShuttingDown,
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Other socket errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Bind { .. } | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display_includes_path() {
        let err = ConfigError::Io {
            path: PathBuf::from("/etc/pulse.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let text = err.to_string();
        assert!(text.contains("/etc/pulse.json"));
        assert!(text.contains("not found"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: ConfigError = json_err.into();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn invalid_value_display() {
        let err = ConfigError::InvalidValue("mailbox_capacity must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "invalid config value: mailbox_capacity must be at least 1"
        );
    }

    #[test]
    fn shutting_down_maps_to_503() {
        let resp = ServerError::ShuttingDown.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn bind_error_maps_to_500() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:80".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("0.0.0.0:80"));
    }
}
