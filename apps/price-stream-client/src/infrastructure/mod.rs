//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the stream client itself and the concrete
//! implementations of the port interfaces defined in the application layer.

/// Price stream client, wire messages, codec, and reconnection.
pub mod feed;

/// WebSocket adapter for the connector port.
pub mod websocket;

/// Environment-driven settings.
pub mod config;

/// Metrics instrumentation through the `metrics` facade.
pub mod metrics;

/// Tracing subscriber setup.
pub mod telemetry;
