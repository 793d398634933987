//! Server configuration and layered loading.
//!
//! Loading flow:
//! 1. Start with compiled [`ServerConfig::default()`]
//! 2. If a config file is given, deep-merge its values over the defaults
//! 3. Apply `PULSE_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Invalid environment values are ignored with a warning so a typo in a
//! deployment manifest falls back to the file/default value.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use pulse_hub::{DEFAULT_MAILBOX_CAPACITY, HubConfig};
use pulse_telemetry::{LogFormat, LoggingConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ConfigError;

/// Configuration for the pulse server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`, `0` for auto-assign).
    pub port: u16,
    /// Pending messages each client may buffer before drops start.
    pub mailbox_capacity: usize,
    /// Seconds between heartbeat broadcasts.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client after this many dropped messages (`None` = never).
    pub slow_client_drop_limit: Option<u64>,
    /// How long shutdown waits for background tasks.
    pub shutdown_timeout_secs: u64,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            heartbeat_interval_secs: 5,
            slow_client_drop_limit: None,
            shutdown_timeout_secs: 10,
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Hub settings derived from this config.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            mailbox_capacity: self.mailbox_capacity,
            slow_client_drop_limit: self.slow_client_drop_limit,
        }
    }

    /// Heartbeat period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue("host must not be empty".into()));
        }
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "mailbox_capacity must be at least 1".into(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "heartbeat_interval_secs must be at least 1".into(),
            ));
        }
        if self.slow_client_drop_limit == Some(0) {
            return Err(ConfigError::InvalidValue(
                "slow_client_drop_limit must be at least 1".into(),
            ));
        }
        pulse_telemetry::logging::parse_filter(&self.logging.level)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        Ok(())
    }
}

/// Load config from an optional file with `PULSE_*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Load config using `lookup` in place of the process environment.
pub fn load_config_with(
    path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfig, ConfigError> {
    let defaults = serde_json::to_value(ServerConfig::default())?;

    let merged = match path {
        Some(path) => {
            debug!(?path, "loading config file");
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        None => defaults,
    };

    let mut config: ServerConfig = serde_json::from_value(merged)?;
    apply_overrides(&mut config, lookup);
    config.validate()?;
    Ok(config)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PULSE_*` overrides read through `lookup`.
pub fn apply_overrides(config: &mut ServerConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = read_string(&lookup, "PULSE_HOST") {
        config.host = v;
    }
    if let Some(v) = read_range(&lookup, "PULSE_PORT", 1_u16, 65_535) {
        config.port = v;
    }
    if let Some(v) = read_range(&lookup, "PULSE_MAILBOX_CAPACITY", 1_usize, 10_000) {
        config.mailbox_capacity = v;
    }
    if let Some(v) = read_range(&lookup, "PULSE_HEARTBEAT_INTERVAL_SECS", 1_u64, 3_600) {
        config.heartbeat_interval_secs = v;
    }
    if let Some(v) = read_range(&lookup, "PULSE_SLOW_CLIENT_DROP_LIMIT", 1_u64, 1_000_000) {
        config.slow_client_drop_limit = Some(v);
    }
    if let Some(v) = read_range(&lookup, "PULSE_SHUTDOWN_TIMEOUT_SECS", 1_u64, 600) {
        config.shutdown_timeout_secs = v;
    }
    if let Some(v) = read_string(&lookup, "PULSE_LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Some(raw) = read_string(&lookup, "PULSE_LOG_FORMAT") {
        match LogFormat::parse(&raw) {
            Some(format) => config.logging.format = format,
            None => warn!(key = "PULSE_LOG_FORMAT", value = %raw, "invalid log format, ignoring"),
        }
    }
}

/// Parse `val` as a number within `[min, max]`.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_string(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.is_empty())
}

fn read_range<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    let val = lookup(key)?;
    let result = parse_range(&val, min, max);
    if result.is_none() {
        warn!(key, value = %val, "invalid numeric env var, ignoring");
    }
    result
}
