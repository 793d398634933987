//! `tracing` subscriber setup.
//!
//! `RUST_LOG`, when set, always wins over the configured level so operators
//! can raise verbosity for a single module without touching config files.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::TelemetryError;

/// Output format of the stdout log layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Pretty,
    /// Newline-delimited JSON objects.
    Json,
}

impl LogFormat {
    /// Parse a format name (case-insensitive).
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `"info"` or `"info,pulse_hub=debug"`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

/// Parse a filter directive without consulting the environment.
pub fn parse_filter(directive: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directive).map_err(|e| TelemetryError::Filter {
        directive: directive.to_owned(),
        reason: e.to_string(),
    })
}

/// Build the active filter: `RUST_LOG` if present, else `directive`.
pub fn build_filter(directive: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => parse_filter(directive),
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(&config.level)?;

    let installed = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(false)
            .try_init(),
    };

    installed.map_err(|e| TelemetryError::Subscriber(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_format_names() {
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("TEXT"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("Json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn default_config() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.level, "info");
        assert_eq!(cfg.format, LogFormat::Pretty);
    }

    #[test]
    fn format_serializes_lowercase() {
        let json = serde_json::to_string(&LogFormat::Json).unwrap();
        assert_eq!(json, "\"json\"");
        let back: LogFormat = serde_json::from_str("\"pretty\"").unwrap();
        assert_eq!(back, LogFormat::Pretty);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "info");
    }

    #[test]
    fn valid_directives_parse() {
        assert!(parse_filter("info").is_ok());
        assert!(parse_filter("warn,pulse_hub=debug").is_ok());
    }

    #[test]
    fn invalid_directive_rejected() {
        let err = parse_filter("pulse_hub=notalevel").unwrap_err();
        assert!(matches!(err, TelemetryError::Filter { .. }));
    }
}
