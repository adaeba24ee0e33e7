//! Price Stream Feed
//!
//! Client for the real-time price stream:
//!
//! - **client**: Connection lifecycle, subscriptions, dispatch
//! - **messages**: Inbound message kinds and outbound commands
//! - **codec**: JSON framing
//! - **reconnect**: Linear backoff policy and timers

pub mod client;
pub mod codec;
mod connection;
pub mod messages;
pub mod reconnect;

pub use client::{ConnectionListener, ListenerId, StreamClient, StreamClientConfig};
pub use codec::{CodecError, JsonCodec};
pub use messages::{Command, InboundMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy, ReconnectTimer};
