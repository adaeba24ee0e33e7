//! Connection Task
//!
//! One spawned task per connection attempt. The task opens the connection
//! through the [`Connector`], reports the open to the client, then pumps
//! queued outbound frames to the sink and inbound frames to the client's
//! dispatcher until the connection ends or the attempt is cancelled.
//!
//! The task holds only a weak reference to the client, so dropping the last
//! client handle ends it.

use std::sync::{Arc, Weak};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::client::ClientInner;
use crate::application::ports::{Connection, Connector};

/// Client-side handle for the connection of one attempt.
///
/// Never reused: each attempt gets a new handle with its own queue and
/// cancellation token.
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Attempt number this handle belongs to.
    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a text frame for the connection task.
    ///
    /// Returns `false` if the task has already exited.
    pub(crate) fn send(&self, frame: String) -> bool {
        self.outbound.send(frame).is_ok()
    }

    /// Ask the connection task to close the connection and exit.
    pub(crate) fn close(&self) {
        self.cancel.cancel();
    }
}

/// Spawn the task for attempt `generation` and return its handle.
pub(crate) fn spawn(
    client: Weak<ClientInner>,
    connector: Arc<dyn Connector>,
    url: String,
    generation: u64,
) -> ConnectionHandle {
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    tokio::spawn(run(
        client,
        connector,
        url,
        generation,
        outbound_rx,
        cancel.clone(),
    ));

    ConnectionHandle {
        generation,
        outbound,
        cancel,
    }
}

async fn run(
    client: Weak<ClientInner>,
    connector: Arc<dyn Connector>,
    url: String,
    generation: u64,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    tracing::info!(url = %url, generation, "Connecting to price stream");

    let result = tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!(generation, "Connection attempt cancelled");
            return;
        }
        result = connector.connect(&url) => result,
    };

    let Connection {
        mut sink,
        mut stream,
    } = match result {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(error = %e, generation, "Price stream connection failed");
            if let Some(inner) = client.upgrade() {
                inner.on_close(generation, e.to_string());
            }
            return;
        }
    };

    match client.upgrade() {
        Some(inner) if inner.on_open(generation) => {}
        _ => {
            let _ = sink.close().await;
            return;
        }
    }

    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(generation, "Closing price stream connection");
                let _ = sink.close().await;
                return;
            }
            Some(frame) = outbound_rx.recv() => {
                if let Err(e) = sink.send(frame).await {
                    break e.to_string();
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(text)) => {
                    let Some(inner) = client.upgrade() else {
                        return;
                    };
                    inner.on_frame(generation, &text);
                }
                Some(Err(e)) => break e.to_string(),
                None => break "connection closed".to_string(),
            },
        }
    };

    let _ = sink.close().await;

    if let Some(inner) = client.upgrade() {
        inner.on_close(generation, reason);
    }
}
