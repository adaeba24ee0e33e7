//! Domain Layer - Core streaming types and subscription state.
//!
//! Pure data types and bookkeeping with no I/O. Everything here can be
//! exercised without a runtime or a connection.

/// Price updates and connection lifecycle types.
pub mod streaming;

/// Callback registry and two-phase subscription status.
pub mod subscription;
