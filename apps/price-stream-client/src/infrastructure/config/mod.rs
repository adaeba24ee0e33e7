//! Configuration Module
//!
//! Settings loading for the stream client.

mod settings;

pub use settings::{ConfigError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_STREAM_URL, StreamSettings};
