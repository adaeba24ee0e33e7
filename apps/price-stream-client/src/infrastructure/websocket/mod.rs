//! WebSocket Connector
//!
//! [`Connector`] implementation over `tokio-tungstenite`. Text frames pass
//! through unchanged; control frames are handled by tungstenite and never
//! reach the client.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, future};
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::{Connection, Connector, FrameSink, FrameStream, TransportError};

/// Opens price stream connections over WebSocket (`ws://` or `wss://`).
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector.
    ///
    /// Installs the `ring` crypto provider for `wss://` if the process has
    /// not installed one yet.
    #[must_use]
    pub fn new() -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        tracing::debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();

        let sink: FrameSink = Box::pin(
            write
                .sink_map_err(|e| TransportError::Io(e.to_string()))
                .with(|text: String| future::ok::<_, TransportError>(Message::Text(text.into()))),
        );

        let stream: FrameStream = Box::pin(read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::warn!(len = data.len(), "Dropping non-UTF-8 binary frame");
                        None
                    }
                },
                Ok(Message::Close(frame)) => Some(Err(TransportError::Closed(
                    frame.map_or_else(
                        || "no close frame".to_string(),
                        |f| format!("{} {}", u16::from(f.code), f.reason.as_str()),
                    ),
                ))),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                Err(e) => Some(Err(TransportError::Io(e.to_string()))),
            })
        }));

        Ok(Connection::new(sink, stream))
    }
}
