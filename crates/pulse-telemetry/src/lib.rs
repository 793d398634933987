//! # pulse-telemetry
//!
//! Structured logging and metrics setup shared by the pulse crates.
//!
//! - [`logging`]: `tracing-subscriber` initialization (pretty or JSON, `RUST_LOG` aware)
//! - [`metrics`]: metric name constants and the Prometheus recorder

#![deny(unsafe_code)]

pub mod logging;
pub mod metrics;

pub use logging::{LogFormat, LoggingConfig, init_logging};

use thiserror::Error;

/// Errors raised while installing process-wide telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global `tracing` subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
    /// The configured log filter directive could not be parsed.
    #[error("invalid log filter '{directive}': {reason}")]
    Filter {
        /// Directive as configured.
        directive: String,
        /// Parser message.
        reason: String,
    },
    /// A global metrics recorder was already installed.
    #[error("failed to install metrics recorder: {0}")]
    Recorder(String),
}
