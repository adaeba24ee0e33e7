//! Application Layer - Port definitions.
//!
//! Defines the seams between the stream client and the outside world.

/// Port interfaces for external systems (streaming transport).
pub mod ports;
