//! # pulse-hub
//!
//! Client registry and broadcast fan-out for streaming clients.
//!
//! - [`ClientHandle`]: per-connection id plus the write half of a bounded mailbox
//! - [`Mailbox`]: the read half, drained by the connection's session
//! - [`BroadcastHub`]: linearizes register / deregister / broadcast behind one lock
//!
//! Delivery is best-effort: a full mailbox drops the message for that client
//! only, so a stalled reader never holds up the broadcaster or other clients.

#![deny(unsafe_code)]

pub mod client;
pub mod hub;

pub use client::{ClientHandle, ClientId, DEFAULT_MAILBOX_CAPACITY, Delivery, Mailbox, TryRecvError};
pub use hub::{BroadcastHub, BroadcastReport, HubConfig};
