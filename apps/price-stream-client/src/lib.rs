#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Stream Client - Real-Time Price Feed
//!
//! Keeps one streaming connection to the dashboard price stream and fans
//! price updates out to any number of in-process consumers, each watching
//! a set of instruments.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core streaming types and subscription bookkeeping
//!   - `streaming`: Price updates, connection state and events
//!   - `subscription`: Callback registry with pending/confirmed status
//!
//! - **Application**: Port definitions
//!   - `ports`: Connector interface for the streaming transport
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Stream client, wire messages, codec, reconnection
//!   - `websocket`: `tokio-tungstenite` connector
//!   - `config`: Environment settings
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                    ┌──────────────┐      ┌──────────────┐
//! Price stream WS ──►│  Connection  │─────►│  Dispatcher  │──► Callback 1
//!                    │     task     │      │  (registry)  │──► Callback 2
//!        ◄───────────│              │◄─────│              │──► Callback N
//!      commands      └──────────────┘      └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Client, adapters, and observability.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{ConnectionEvent, ConnectionState, InstrumentId, PriceUpdate};
pub use domain::subscription::{PriceCallback, SubscriptionStatus};

// Ports (for custom transports and tests)
pub use application::ports::{Connection, Connector, FrameSink, FrameStream, TransportError};

// Client
pub use infrastructure::feed::{
    ConnectionListener, ListenerId, ReconnectConfig, StreamClient, StreamClientConfig,
};

// Transport
pub use infrastructure::websocket::WebSocketConnector;

// Config
pub use infrastructure::config::{ConfigError, StreamSettings};

// Metrics
pub use infrastructure::metrics::describe_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryError, init as init_telemetry};
