//! Price Stream Client
//!
//! Owns the single streaming connection to the price stream, the
//! subscription registry, and the reconnection policy.
//!
//! # Lifecycle
//!
//! ```text
//!                connect()                 open
//! Disconnected ───────────► Connecting ───────────► Connected
//!      ▲                        │                       │
//!      │     attempt failed     │      peer closed      │
//!      └────────────────────────┴───────────────────────┘
//!            schedule reconnect (base × attempt) until exhausted
//! ```
//!
//! Every successful open replays the whole desired subscription set in a
//! single `subscribe` command. `disconnect()` is a full teardown and never
//! reconnects.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::codec::JsonCodec;
use super::connection::{self, ConnectionHandle};
use super::messages::{Command, InboundMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy, ReconnectTimer};
use crate::application::ports::Connector;
use crate::domain::streaming::{ConnectionEvent, ConnectionState, InstrumentId, PriceUpdate};
use crate::domain::subscription::{PriceCallback, SubscriptionRegistry, SubscriptionStatus};
use crate::infrastructure::config::{DEFAULT_CONNECT_TIMEOUT, StreamSettings};
use crate::infrastructure::metrics;
use crate::infrastructure::websocket::WebSocketConnector;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamClientConfig {
    /// WebSocket URL of the price stream.
    pub url: String,
    /// Bound on how long `connect()` waits for the open.
    pub connect_timeout: Duration,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl StreamClientConfig {
    /// Create a new configuration with default timeouts.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Create configuration from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self {
            url: settings.url.clone(),
            connect_timeout: settings.connect_timeout,
            reconnect: ReconnectConfig::new(
                settings.reconnect_delay,
                settings.max_reconnect_attempts,
            ),
        }
    }

    /// Override the connect bound.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Override the reconnection configuration.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// =============================================================================
// Listeners
// =============================================================================

/// Callback invoked on connection events.
pub type ConnectionListener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Handle returned by [`StreamClient::on_connection_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

// =============================================================================
// Shared State
// =============================================================================

struct SharedState {
    state: ConnectionState,
    registry: SubscriptionRegistry,
    listeners: Vec<(ListenerId, ConnectionListener)>,
    next_listener_id: u64,
    connection: Option<ConnectionHandle>,
    generation: u64,
    policy: ReconnectPolicy,
    reconnect_timer: Option<ReconnectTimer>,
    next_timer_id: u64,
}

impl SharedState {
    fn listeners(&self) -> Vec<ConnectionListener> {
        self.listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

/// State shared between client handles, connection tasks and timers.
pub(crate) struct ClientInner {
    config: StreamClientConfig,
    connector: Arc<dyn Connector>,
    codec: JsonCodec,
    state_tx: watch::Sender<ConnectionState>,
    shared: Mutex<SharedState>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut();
        shared.reconnect_timer = None;
        if let Some(connection) = shared.connection.take() {
            connection.close();
        }
    }
}

impl ClientInner {
    fn set_state(&self, shared: &mut SharedState, state: ConnectionState) {
        if shared.state != state {
            tracing::debug!(from = shared.state.as_str(), to = state.as_str(), "Connection state changed");
        }
        shared.state = state;
        self.state_tx.send_replace(state);
        metrics::set_connected(state == ConnectionState::Connected);
    }

    /// Start a new connection attempt, superseding any previous one.
    fn start_attempt(self: &Arc<Self>, shared: &mut SharedState) {
        shared.generation += 1;

        let handle = connection::spawn(
            Arc::downgrade(self),
            Arc::clone(&self.connector),
            self.config.url.clone(),
            shared.generation,
        );

        if let Some(previous) = shared.connection.replace(handle) {
            previous.close();
        }

        self.set_state(shared, ConnectionState::Connecting);
    }

    /// Queue a command on the live connection.
    ///
    /// Sending while not connected is a logged no-op; intent made while
    /// disconnected is carried by the registry instead.
    fn send_command(&self, shared: &SharedState, command: &Command) -> bool {
        let connection = match (&shared.connection, shared.state) {
            (Some(connection), ConnectionState::Connected) => connection,
            _ => {
                tracing::warn!(
                    action = command.action(),
                    instruments = ?command.instruments(),
                    state = shared.state.as_str(),
                    "Not connected, command not sent"
                );
                return false;
            }
        };

        let frame = match self.codec.encode(command) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, action = command.action(), "Failed to encode command");
                return false;
            }
        };

        tracing::debug!(
            action = command.action(),
            instruments = ?command.instruments(),
            generation = connection.generation(),
            "Sending command"
        );

        if connection.send(frame) {
            true
        } else {
            tracing::warn!(action = command.action(), "Connection task gone, command dropped");
            false
        }
    }

    /// Connection of attempt `generation` opened.
    ///
    /// Listeners hear `Connected` before the desired set is replayed.
    /// Returns `false` if the attempt has been superseded.
    pub(crate) fn on_open(&self, generation: u64) -> bool {
        let listeners = {
            let mut shared = self.shared.lock();
            if !shared.is_current(generation) {
                tracing::debug!(generation, "Ignoring open of superseded attempt");
                return false;
            }

            self.set_state(&mut shared, ConnectionState::Connected);
            shared.policy.reset();
            shared.listeners()
        };

        tracing::info!(generation, "Price stream connected");
        notify(&listeners, &[ConnectionEvent::Connected]);

        // A listener may have disconnected or reconnected in between.
        let shared = self.shared.lock();
        if shared.is_current(generation) && shared.state == ConnectionState::Connected {
            let desired = shared.registry.desired();
            if !desired.is_empty() {
                tracing::info!(count = desired.len(), "Restoring subscriptions");
                self.send_command(&shared, &Command::subscribe(desired));
            }
        }
        true
    }

    /// Connection of attempt `generation` closed or failed to open.
    pub(crate) fn on_close(self: &Arc<Self>, generation: u64, reason: String) {
        let (listeners, events) = {
            let mut shared = self.shared.lock();
            if !shared.is_current(generation) {
                tracing::debug!(generation, "Ignoring close of superseded attempt");
                return;
            }

            shared.connection = None;
            self.set_state(&mut shared, ConnectionState::Disconnected);
            shared.registry.revert_to_pending();

            tracing::warn!(reason = %reason, generation, "Price stream disconnected");
            let mut events = vec![ConnectionEvent::Disconnected { reason }];

            if let Some(delay) = shared.policy.next_delay() {
                let attempt = shared.policy.attempt_count();
                self.schedule_reconnect(&mut shared, attempt, delay);
                events.push(ConnectionEvent::Reconnecting { attempt, delay });
            } else {
                let attempts = shared.policy.attempt_count();
                tracing::error!(attempts, "Maximum reconnection attempts reached, giving up");
                events.push(ConnectionEvent::ReconnectFailed { attempts });
            }

            (shared.listeners(), events)
        };

        notify(&listeners, &events);
    }

    fn schedule_reconnect(self: &Arc<Self>, shared: &mut SharedState, attempt: u32, delay: Duration) {
        shared.next_timer_id += 1;
        let timer_id = shared.next_timer_id;
        let client = Arc::downgrade(self);

        tracing::info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting to price stream"
        );
        metrics::record_reconnect();

        shared.reconnect_timer = Some(ReconnectTimer::schedule(timer_id, attempt, delay, move || {
            if let Some(inner) = client.upgrade() {
                inner.on_reconnect_timer(timer_id);
            }
        }));
    }

    fn on_reconnect_timer(self: &Arc<Self>, timer_id: u64) {
        let mut shared = self.shared.lock();

        let attempt = match &shared.reconnect_timer {
            Some(timer) if timer.id() == timer_id => timer.attempt(),
            _ => return,
        };
        shared.reconnect_timer = None;

        if shared.state != ConnectionState::Disconnected {
            return;
        }

        tracing::debug!(attempt, "Reconnect timer fired");
        self.start_attempt(&mut shared);
    }

    /// Dispatch one inbound text frame of attempt `generation`.
    pub(crate) fn on_frame(&self, generation: u64, text: &str) {
        let message = match self.codec.decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                metrics::record_malformed_frame();
                return;
            }
        };

        metrics::record_message_received(message.kind());

        match message {
            InboundMessage::ConnectionStatus {
                subscribed_stocks,
                message,
                ..
            } => {
                tracing::info!(
                    message = message.as_deref().unwrap_or_default(),
                    subscribed = ?subscribed_stocks,
                    "Connection status received"
                );
                self.with_current(generation, |shared| {
                    shared.registry.confirm(&subscribed_stocks);
                });
            }
            InboundMessage::PriceUpdate { data, .. } => self.dispatch_price(generation, &data),
            InboundMessage::SubscribeResponse { subscribed, .. } => {
                tracing::debug!(subscribed = ?subscribed, "Subscription confirmed");
                self.with_current(generation, |shared| {
                    shared.registry.confirm(&subscribed);
                    metrics::set_subscriptions(shared.registry.len());
                });
            }
            InboundMessage::UnsubscribeResponse { unsubscribed, .. } => {
                tracing::debug!(unsubscribed = ?unsubscribed, "Unsubscription confirmed");
                self.with_current(generation, |shared| {
                    shared.registry.release(&unsubscribed);
                    metrics::set_subscriptions(shared.registry.len());
                });
            }
            InboundMessage::Error { message, .. } => {
                tracing::error!(
                    message = message.as_deref().unwrap_or("unspecified"),
                    "Price stream error"
                );
            }
            InboundMessage::Subscriptions {
                subscribed_stocks, ..
            } => {
                tracing::info!(subscribed = ?subscribed_stocks, "Server-held subscriptions");
            }
            InboundMessage::Unknown => {
                tracing::debug!("Ignoring message of unknown kind");
            }
        }
    }

    fn with_current<R>(&self, generation: u64, f: impl FnOnce(&mut SharedState) -> R) -> Option<R> {
        let mut shared = self.shared.lock();
        shared.is_current(generation).then(|| f(&mut shared))
    }

    fn dispatch_price(&self, generation: u64, update: &PriceUpdate) {
        let Some(callbacks) = self.with_current(generation, |shared| {
            shared.registry.callbacks_for(&update.instrument)
        }) else {
            return;
        };

        if callbacks.is_empty() {
            tracing::trace!(instrument = %update.instrument, "No callbacks for price update");
            return;
        }

        for (index, callback) in callbacks.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(update))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        instrument = %update.instrument,
                        index,
                        error = %e,
                        "Price callback failed"
                    );
                    metrics::record_callback_failure();
                }
                Err(_) => {
                    tracing::error!(instrument = %update.instrument, index, "Price callback panicked");
                    metrics::record_callback_failure();
                }
            }
        }
    }
}

fn notify(listeners: &[ConnectionListener], events: &[ConnectionEvent]) {
    for event in events {
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(event = ?event, "Connection listener panicked");
            }
        }
    }
}

// =============================================================================
// Stream Client
// =============================================================================

/// Real-time price stream client.
///
/// Cheap to clone; all clones share one connection and one registry.
///
/// Manages:
/// - One connection at a time, idempotent `connect()`
/// - Subscriptions queued while disconnected and replayed on every connect
/// - Fan-out of price updates to every callback of an instrument
/// - Linear backoff reconnection with a bounded attempt count
///
/// # Example
///
/// ```no_run
/// use price_stream_client::{StreamClient, StreamClientConfig};
///
/// # async fn run() {
/// let client = StreamClient::websocket(StreamClientConfig::new("wss://prices.example.com/ws"));
///
/// client.on_connection_change(|event| {
///     println!("connected: {} ({:?})", event.is_connected(), event.reason());
/// });
/// client.subscribe(["005930", "000660"], |update| {
///     println!("{} {}", update.instrument, update.price);
///     Ok(())
/// });
///
/// if !client.connect().await {
///     eprintln!("price stream unavailable, retrying in the background");
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("StreamClient")
            .field("url", &self.inner.config.url)
            .field("state", &shared.state)
            .field("registry", &shared.registry)
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    /// Create a client that opens connections through `connector`.
    #[must_use]
    pub fn new(config: StreamClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let policy = ReconnectPolicy::new(config.reconnect.clone());

        Self {
            inner: Arc::new(ClientInner {
                config,
                connector,
                codec: JsonCodec::new(),
                state_tx,
                shared: Mutex::new(SharedState {
                    state: ConnectionState::Disconnected,
                    registry: SubscriptionRegistry::new(),
                    listeners: Vec::new(),
                    next_listener_id: 0,
                    connection: None,
                    generation: 0,
                    policy,
                    reconnect_timer: None,
                    next_timer_id: 0,
                }),
            }),
        }
    }

    /// Create a client backed by a WebSocket connection.
    #[must_use]
    pub fn websocket(config: StreamClientConfig) -> Self {
        Self::new(config, Arc::new(WebSocketConnector::new()))
    }

    /// Connect to the price stream.
    ///
    /// Returns `true` once connected. An attempt already in flight is joined
    /// rather than duplicated. Resolves `false` if the attempt fails or does
    /// not open within the connect timeout; a timed-out attempt keeps running
    /// and may still connect later.
    pub async fn connect(&self) -> bool {
        let mut state_rx = {
            let mut shared = self.inner.shared.lock();
            match shared.state {
                ConnectionState::Connected => return true,
                ConnectionState::Connecting => {
                    tracing::debug!("Connection attempt already in flight");
                }
                ConnectionState::Disconnected => {
                    shared.reconnect_timer = None;
                    shared.policy.reset();
                    self.inner.start_attempt(&mut shared);
                }
            }
            self.inner.state_tx.subscribe()
        };

        let outcome = tokio::time::timeout(
            self.inner.config.connect_timeout,
            state_rx.wait_for(|state| *state != ConnectionState::Connecting),
        )
        .await;

        match outcome {
            Ok(Ok(state)) => *state == ConnectionState::Connected,
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = u64::try_from(self.inner.config.connect_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                    "Timed out waiting for price stream connection"
                );
                false
            }
        }
    }

    /// Tear the client down.
    ///
    /// Closes the connection without reconnecting, cancels any scheduled
    /// reconnection, and drops every callback and subscription. Connection
    /// listeners stay registered.
    pub fn disconnect(&self) {
        let listeners = {
            let mut shared = self.inner.shared.lock();

            shared.generation += 1;
            if let Some(connection) = shared.connection.take() {
                connection.close();
            }
            shared.reconnect_timer = None;
            shared.policy.reset();
            shared.registry.clear();
            metrics::set_subscriptions(0);

            let was_disconnected = shared.state == ConnectionState::Disconnected;
            self.inner
                .set_state(&mut shared, ConnectionState::Disconnected);

            (!was_disconnected).then(|| shared.listeners())
        };

        tracing::info!("Price stream client disconnected");

        if let Some(listeners) = listeners {
            notify(
                &listeners,
                &[ConnectionEvent::Disconnected {
                    reason: "client disconnect".to_string(),
                }],
            );
        }
    }

    /// Watch `instruments` with `callback`.
    ///
    /// The callback is appended to each instrument's sequence. When
    /// connected, a `subscribe` command carrying exactly these instruments is
    /// sent; otherwise they wait as pending and go out with the next connect.
    pub fn subscribe<I, S, F>(&self, instruments: I, callback: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<InstrumentId>,
        F: Fn(&PriceUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: PriceCallback = Arc::new(callback);
        self.subscribe_shared(instruments, &callback);
    }

    /// Watch `instruments` with an already shared callback.
    pub fn subscribe_shared<I, S>(&self, instruments: I, callback: &PriceCallback)
    where
        I: IntoIterator<Item = S>,
        S: Into<InstrumentId>,
    {
        let instruments: Vec<InstrumentId> = instruments.into_iter().map(Into::into).collect();
        if instruments.is_empty() {
            return;
        }

        let mut shared = self.inner.shared.lock();
        shared.registry.subscribe(&instruments, callback);
        metrics::set_subscriptions(shared.registry.len());

        if shared.state == ConnectionState::Connected {
            self.inner
                .send_command(&shared, &Command::subscribe(instruments));
        } else {
            tracing::debug!(
                instruments = ?instruments,
                state = shared.state.as_str(),
                "Queued subscriptions until connected"
            );
        }
    }

    /// Stop watching `instruments`.
    ///
    /// Drops every callback registered for them, not just the caller's.
    pub fn unsubscribe<I, S>(&self, instruments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<InstrumentId>,
    {
        let instruments: Vec<InstrumentId> = instruments.into_iter().map(Into::into).collect();
        if instruments.is_empty() {
            return;
        }

        let mut shared = self.inner.shared.lock();
        let removed = shared.registry.unsubscribe(&instruments);
        metrics::set_subscriptions(shared.registry.len());
        tracing::debug!(requested = ?instruments, removed = ?removed, "Unsubscribed");

        if shared.state == ConnectionState::Connected {
            self.inner
                .send_command(&shared, &Command::unsubscribe(instruments));
        }
    }

    /// Ask the server which instruments it holds for this connection.
    ///
    /// The reply arrives as a `subscriptions` message and is logged.
    pub fn request_subscriptions(&self) -> bool {
        let shared = self.inner.shared.lock();
        self.inner
            .send_command(&shared, &Command::GetSubscriptions)
    }

    /// Register a listener for connection events.
    pub fn on_connection_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let mut shared = self.inner.shared.lock();
        shared.next_listener_id += 1;
        let id = ListenerId(shared.next_listener_id);
        shared.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Detach a connection listener. Returns `false` if it was not registered.
    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        let mut shared = self.inner.shared.lock();
        let before = shared.listeners.len();
        shared.listeners.retain(|(listener_id, _)| *listener_id != id);
        shared.listeners.len() != before
    }

    /// Check if the client is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Snapshot of the desired instruments, sorted.
    #[must_use]
    pub fn current_subscriptions(&self) -> Vec<InstrumentId> {
        self.inner.shared.lock().registry.desired()
    }

    /// Snapshot of the desired instruments with their status, sorted.
    #[must_use]
    pub fn subscriptions_with_status(&self) -> Vec<(InstrumentId, SubscriptionStatus)> {
        self.inner.shared.lock().registry.statuses()
    }

    /// Status of one instrument, if it is desired.
    #[must_use]
    pub fn subscription_status(&self, instrument: &str) -> Option<SubscriptionStatus> {
        self.inner.shared.lock().registry.status(instrument)
    }

    /// Number of callbacks registered for an instrument.
    #[must_use]
    pub fn subscriber_count(&self, instrument: &str) -> usize {
        self.inner.shared.lock().registry.callback_count(instrument)
    }

    /// Number of reconnection attempts since the last successful connect.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().policy.attempt_count()
    }

    /// Check if a reconnection is currently scheduled.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.inner.shared.lock().reconnect_timer.is_some()
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &StreamClientConfig {
        &self.inner.config
    }

    #[cfg(test)]
    fn weak(&self) -> std::sync::Weak<ClientInner> {
        Arc::downgrade(&self.inner)
    }
}
