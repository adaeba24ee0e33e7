//! Streaming Types
//!
//! Price updates delivered by the stream and the connection lifecycle as
//! seen by consumers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Instruments and Prices
// =============================================================================

/// Opaque instrument identifier (stock ticker or exchange code).
pub type InstrumentId = String;

/// Real-time price update for a single instrument.
///
/// Only ever decoded from inbound `price_update` frames. Callbacks receive it
/// by shared reference; one value is handed to every callback registered for
/// the instrument.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "instrument": "005930",
///   "price": 71200,
///   "change_amount": -300,
///   "change_percent": -0.42,
///   "volume": 10442321,
///   "trading_value": 743500000000,
///   "timestamp": "2024-03-15T05:21:07Z",
///   "source": "realtime"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// Instrument the price belongs to.
    #[serde(alias = "stock_code", alias = "symbol")]
    pub instrument: InstrumentId,

    /// Last traded price.
    #[serde(alias = "current_price")]
    pub price: Decimal,

    /// Absolute change against the previous close.
    #[serde(default, alias = "changeAmount")]
    pub change_amount: Decimal,

    /// Percentage change against the previous close.
    #[serde(default, alias = "changePercent", alias = "change_rate")]
    pub change_percent: Decimal,

    /// Accumulated traded volume.
    #[serde(default)]
    pub volume: u64,

    /// Accumulated traded value.
    #[serde(default, alias = "tradingValue")]
    pub trading_value: Decimal,

    /// Exchange timestamp of the update.
    pub timestamp: DateTime<Utc>,

    /// Upstream source label.
    #[serde(default)]
    pub source: String,
}

impl PriceUpdate {
    /// Check if the price is above the previous close.
    #[must_use]
    pub fn is_gain(&self) -> bool {
        self.change_amount.is_sign_positive() && !self.change_amount.is_zero()
    }

    /// Check if the price is below the previous close.
    #[must_use]
    pub fn is_loss(&self) -> bool {
        self.change_amount.is_sign_negative() && !self.change_amount.is_zero()
    }
}

// =============================================================================
// Connection Lifecycle
// =============================================================================

/// Connection state of a stream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No live connection and no attempt in flight.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected; commands are sent immediately.
    Connected,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Events delivered to connection listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection opened and pending subscriptions were flushed.
    Connected,
    /// The connection closed or an attempt failed.
    Disconnected {
        /// Human-readable close reason.
        reason: String,
    },
    /// A reconnection attempt has been scheduled.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt runs.
        delay: Duration,
    },
    /// Reconnection gave up; only an explicit `connect()` tries again.
    ReconnectFailed {
        /// Number of reconnection attempts made.
        attempts: u32,
    },
}

impl ConnectionEvent {
    /// Connection state carried by the event.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Human-readable reason for the event.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Connected => Some("connected"),
            Self::Disconnected { reason } => Some(reason),
            Self::Reconnecting { .. } => None,
            Self::ReconnectFailed { .. } => Some("maximum reconnection attempts reached"),
        }
    }

    /// Check if this event ends automatic reconnection.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::ReconnectFailed { .. })
    }
}
