//! Shared helpers for stream client integration tests.
//!
//! [`MockConnector`] stands in for the WebSocket transport. Every accepted
//! connection hands a [`MockServer`] to the test, which can read the
//! commands the client sent and push frames back.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

use price_stream_client::{
    Connection, ConnectionEvent, Connector, FrameSink, FrameStream, StreamClient, TransportError,
};

/// How the mock answers one connection attempt.
#[derive(Debug, Clone, Copy)]
pub enum Plan {
    /// Open immediately.
    Accept,
    /// Fail immediately.
    Refuse,
    /// Open after a delay.
    Delay(Duration),
}

/// In-memory connector with a scripted plan per attempt.
///
/// Attempts beyond the script use the fallback plan.
pub struct MockConnector {
    script: Mutex<VecDeque<Plan>>,
    fallback: Plan,
    attempts: AtomicUsize,
    attempt_times: Mutex<Vec<Instant>>,
    servers: mpsc::UnboundedSender<MockServer>,
}

impl MockConnector {
    /// Connector that accepts every attempt.
    pub fn accepting() -> (Arc<Self>, Servers) {
        Self::scripted(Vec::new(), Plan::Accept)
    }

    /// Connector that refuses every attempt.
    pub fn refusing() -> (Arc<Self>, Servers) {
        Self::scripted(Vec::new(), Plan::Refuse)
    }

    /// Connector that follows `script`, then `fallback`.
    pub fn scripted(script: Vec<Plan>, fallback: Plan) -> (Arc<Self>, Servers) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            attempts: AtomicUsize::new(0),
            attempt_times: Mutex::new(Vec::new()),
            servers,
        });
        (connector, Servers(rx))
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Instant of each attempt, in order.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().clone()
    }

    fn open(&self) -> Connection {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let sink: FrameSink = Box::pin(futures::sink::unfold(
            sent_tx,
            |tx, frame: String| async move {
                tx.send(frame)
                    .map_err(|e| TransportError::Io(e.to_string()))?;
                Ok::<_, TransportError>(tx)
            },
        ));
        let stream: FrameStream = Box::pin(UnboundedReceiverStream::new(inbound_rx));

        let _ = self.servers.send(MockServer {
            sent_rx,
            inbound_tx,
        });

        Connection::new(sink, stream)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Connection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().push(Instant::now());

        let plan = self.script.lock().pop_front().unwrap_or(self.fallback);
        match plan {
            Plan::Accept => Ok(self.open()),
            Plan::Refuse => Err(TransportError::ConnectFailed(
                "connection refused".to_string(),
            )),
            Plan::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.open())
            }
        }
    }
}

/// Server ends of accepted connections, in order.
pub struct Servers(mpsc::UnboundedReceiver<MockServer>);

impl Servers {
    /// Wait for the next accepted connection.
    pub async fn next(&mut self) -> MockServer {
        tokio::time::timeout(Duration::from_secs(30), self.0.recv())
            .await
            .expect("no connection accepted")
            .expect("connector dropped")
    }
}

/// Server end of one mock connection.
pub struct MockServer {
    sent_rx: mpsc::UnboundedReceiver<String>,
    inbound_tx: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl MockServer {
    /// Deliver a raw text frame to the client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.inbound_tx.send(Ok(frame.into()));
    }

    /// Deliver a JSON frame to the client.
    pub fn push_json(&self, value: &Value) {
        self.push(value.to_string());
    }

    /// Close the connection from the server side.
    pub fn close(&self, reason: &str) {
        let _ = self
            .inbound_tx
            .send(Err(TransportError::Closed(reason.to_string())));
    }

    /// Wait for the next command the client sent.
    pub async fn next_command(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.sent_rx.recv())
            .await
            .expect("no command sent")
            .expect("connection closed");
        serde_json::from_str(&frame).unwrap()
    }

    /// Next command if one is already queued.
    pub fn try_next_command(&mut self) -> Option<Value> {
        self.sent_rx
            .try_recv()
            .ok()
            .map(|frame| serde_json::from_str(&frame).unwrap())
    }

    /// Wait until the client drops its end of the connection.
    pub async fn wait_closed(&mut self) {
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while self.sent_rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "client kept the connection open");
    }
}

/// Build a `price_update` frame.
pub fn price_update(instrument: &str, price: i64) -> Value {
    serde_json::json!({
        "type": "price_update",
        "data": {
            "instrument": instrument,
            "price": price,
            "change_amount": 100,
            "change_percent": 0.5,
            "volume": 1000,
            "timestamp": "2024-03-15T05:21:07Z",
            "source": "realtime"
        },
        "timestamp": "2024-03-15T05:21:07Z"
    })
}

/// Record every connection event the client emits.
pub fn record_events(client: &StreamClient) -> Arc<Mutex<Vec<ConnectionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    client.on_connection_change(move |event| sink.lock().push(event.clone()));
    events
}

/// Poll `condition` until it holds, failing the test after `limit`.
pub async fn wait_until<F>(limit: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met within {limit:?}");
}

/// Await `future` with a test-sized bound.
pub async fn bounded<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("future did not complete")
}
