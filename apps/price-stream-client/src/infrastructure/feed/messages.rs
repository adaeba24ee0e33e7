//! Price Stream Message Types
//!
//! Wire format types for the price stream's JSON protocol.
//!
//! # Message Types
//!
//! ## Inbound (server → client), discriminated by `type`
//! - `connection_status`: Greeting, lists instruments the server already holds
//! - `price_update`: Real-time price for one instrument
//! - `subscribe_response`: Confirms instruments added
//! - `unsubscribe_response`: Confirms instruments removed
//! - `error`: Server-side error description
//! - `subscriptions`: Listing of server-held subscriptions
//!
//! ## Outbound (client → server), discriminated by `action`
//! - `subscribe` / `unsubscribe` with an `instruments` list
//! - `get_subscriptions`

use serde::{Deserialize, Serialize};

use crate::domain::streaming::{InstrumentId, PriceUpdate};

// =============================================================================
// Inbound Messages
// =============================================================================

/// Message received from the price stream.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "subscribe_response", "subscribed": ["005930"], "timestamp": "..."}
/// {"type": "price_update", "data": {"instrument": "005930", "price": 71200, ...}}
/// ```
///
/// Kinds this client does not know decode to [`InboundMessage::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Connection greeting.
    ConnectionStatus {
        /// Instruments the server already streams for this connection.
        #[serde(default)]
        subscribed_stocks: Vec<InstrumentId>,
        /// Status text.
        #[serde(default)]
        message: Option<String>,
        /// Server timestamp.
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// Real-time price update.
    PriceUpdate {
        /// The update itself.
        data: PriceUpdate,
        /// Server timestamp.
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// Subscribe acknowledgement.
    SubscribeResponse {
        /// Instruments now subscribed.
        #[serde(default)]
        subscribed: Vec<InstrumentId>,
        /// Status text.
        #[serde(default)]
        message: Option<String>,
        /// Server timestamp.
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// Unsubscribe acknowledgement.
    UnsubscribeResponse {
        /// Instruments no longer subscribed.
        #[serde(default)]
        unsubscribed: Vec<InstrumentId>,
        /// Status text.
        #[serde(default)]
        message: Option<String>,
        /// Server timestamp.
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// Server-side error.
    Error {
        /// Error description.
        #[serde(default)]
        message: Option<String>,
        /// Server timestamp.
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// Server-held subscriptions, sent in reply to `get_subscriptions`.
    Subscriptions {
        /// Subscribed instruments.
        #[serde(default, alias = "subscribed")]
        subscribed_stocks: Vec<InstrumentId>,
        /// Server timestamp.
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// Any kind this client does not understand.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Wire name of the message kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionStatus { .. } => "connection_status",
            Self::PriceUpdate { .. } => "price_update",
            Self::SubscribeResponse { .. } => "subscribe_response",
            Self::UnsubscribeResponse { .. } => "unsubscribe_response",
            Self::Error { .. } => "error",
            Self::Subscriptions { .. } => "subscriptions",
            Self::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Outbound Commands
// =============================================================================

/// Command sent to the price stream.
///
/// # Wire Format (JSON)
/// ```json
/// {"action": "subscribe", "instruments": ["005930", "000660"]}
/// {"action": "unsubscribe", "instruments": ["005930"]}
/// {"action": "get_subscriptions"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Start streaming the listed instruments.
    Subscribe {
        /// Instruments to add.
        instruments: Vec<InstrumentId>,
    },
    /// Stop streaming the listed instruments.
    Unsubscribe {
        /// Instruments to remove.
        instruments: Vec<InstrumentId>,
    },
    /// Ask the server which instruments it holds for this connection.
    GetSubscriptions,
}

impl Command {
    /// Create a subscribe command.
    #[must_use]
    pub const fn subscribe(instruments: Vec<InstrumentId>) -> Self {
        Self::Subscribe { instruments }
    }

    /// Create an unsubscribe command.
    #[must_use]
    pub const fn unsubscribe(instruments: Vec<InstrumentId>) -> Self {
        Self::Unsubscribe { instruments }
    }

    /// Wire name of the action.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::GetSubscriptions => "get_subscriptions",
        }
    }

    /// Instruments carried by the command.
    #[must_use]
    pub fn instruments(&self) -> &[InstrumentId] {
        match self {
            Self::Subscribe { instruments } | Self::Unsubscribe { instruments } => instruments,
            Self::GetSubscriptions => &[],
        }
    }
}
