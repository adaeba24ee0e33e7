//! Tracing Subscriber Setup
//!
//! Optional helper for binaries and tests that embed the client and have no
//! subscriber of their own. Libraries that already install one can skip it;
//! the client only emits `tracing` events.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard filter directives, merged over the defaults
//!
//! # Usage
//!
//! ```ignore
//! use price_stream_client::infrastructure::telemetry;
//!
//! telemetry::init()?;
//! tracing::info!("Price stream starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter directive for client events.
const DEFAULT_DIRECTIVE: &str = "price_stream_client=info";

/// Telemetry errors.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A filter directive could not be parsed.
    #[error("invalid filter directive {directive:?}: {reason}")]
    InvalidDirective {
        /// Offending directive.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter directives applied before `RUST_LOG`.
    pub directives: Vec<String>,
    /// Include the event target in output.
    pub with_target: bool,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            directives: vec![
                DEFAULT_DIRECTIVE.to_string(),
                "tungstenite=warn".to_string(),
                "tokio_tungstenite=warn".to_string(),
            ],
            with_target: true,
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// `PRICE_STREAM_LOG_FORMAT=json` switches to JSON output.
    #[must_use]
    pub fn from_env() -> Self {
        let json = std::env::var("PRICE_STREAM_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Self {
            json,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        self.directives
            .iter()
            .try_fold(EnvFilter::from_default_env(), |filter, directive| {
                let parsed = directive.parse::<Directive>().map_err(|e| {
                    TelemetryError::InvalidDirective {
                        directive: directive.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(filter.add_directive(parsed))
            })
    }
}

/// Install a global subscriber configured from the environment.
///
/// # Errors
///
/// Returns an error if a subscriber is already installed.
pub fn init() -> Result<(), TelemetryError> {
    init_with_config(&TelemetryConfig::from_env())
}

/// Install a global subscriber with custom configuration.
///
/// # Errors
///
/// Returns an error if a directive is invalid or a subscriber is already
/// installed.
pub fn init_with_config(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = config.env_filter()?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json {
        registry.with(fmt_layer.json()).try_init()
    } else {
        registry.with(fmt_layer).try_init()
    };

    result.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}
