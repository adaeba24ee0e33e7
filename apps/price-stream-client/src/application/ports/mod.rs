//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Connector`: Opens one duplex text-frame connection per call
//!
//! The stream client never reuses a [`Connection`]; every attempt asks the
//! connector for a fresh one.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

/// Outbound half of a connection: accepts UTF-8 text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a connection: yields UTF-8 text frames.
///
/// The stream ending, or yielding an error, means the connection is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Transport-level errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// The peer closed the connection.
    #[error("connection closed by peer: {0}")]
    Closed(String),

    /// Reading or writing a frame failed.
    #[error("transport error: {0}")]
    Io(String),
}

/// A single established connection.
pub struct Connection {
    /// Frames sent to the server.
    pub sink: FrameSink,
    /// Frames received from the server.
    pub stream: FrameStream,
}

impl Connection {
    /// Create a connection from its two halves.
    #[must_use]
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens connections to the price stream endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectFailed`] when the endpoint cannot be
    /// reached or the handshake fails.
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}
