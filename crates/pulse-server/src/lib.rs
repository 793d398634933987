//! # pulse-server
//!
//! Axum HTTP server that fans broadcast messages out to Server-Sent Events
//! clients.
//!
//! - `/events` opens a streaming session registered with the [`BroadcastHub`]
//! - `/hello`, `/ping`, `/health`, `/metrics` are plain request/response
//! - a heartbeat task broadcasts the server time periodically
//!
//! [`BroadcastHub`]: pulse_hub::BroadcastHub

pub mod config;
pub mod errors;
pub mod health;
pub mod heartbeat;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod sse;

pub use config::{ServerConfig, load_config};
pub use errors::{ConfigError, ServerError};
pub use server::{AppState, PulseServer};
pub use shutdown::ShutdownCoordinator;
