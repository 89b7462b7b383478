//! Boidlink - real-time bridge between a reactive UI runtime and the boid
//! simulation server.
//!
//! The crate does exactly one non-trivial thing: it holds a single
//! persistent WebSocket connection to the server and relays messages in
//! both directions. Inbound server frames are forwarded verbatim into the
//! UI runtime's update channel; outbound UI commands are wrapped in a
//! single-key JSON envelope and written to the wire.
//!
//! # Architecture
//!
//! - [`socket`] - Connection manager: one WebSocket per process, a
//!   cloneable sender handle and a take-once inbound event stream
//! - [`bridge`] - The bidirectional relay between the connection and the
//!   UI runtime's channel pair
//! - [`command`] - Outbound command types and their wire envelope
//! - [`config`] - Startup configuration (target host and port)
//! - [`error`] - Error taxonomy for connection and bridge failures

pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod socket;

// Re-export commonly used types
pub use bridge::{ui_channels, Bridge, UiChannels, UiHandle};
pub use command::UiCommand;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use socket::{socket_url, Connection, SocketEvent, SocketEvents, SocketSender};
