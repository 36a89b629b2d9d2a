/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # CMO Logging Module
//!
//! Installs the global `tracing` subscriber used by every CMO binary.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cmo_utils::logging::{self, prelude::*};
//!
//! logging::init("info", "json")?;
//! info!(subscription_id = %id, "Subscription created");
//! ```
//!
//! `RUST_LOG`, when set, takes precedence over the configured level.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Error type for logging initialization
#[derive(Debug)]
pub enum LoggingError {
    /// The level string could not be parsed as a filter directive
    InvalidLevel(String),
    /// A global subscriber was already installed
    SubscriberError(String),
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggingError::InvalidLevel(e) => write!(f, "Invalid log level: {}", e),
            LoggingError::SubscriberError(e) => write!(f, "Subscriber error: {}", e),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Builds the level filter, preferring `RUST_LOG` over `level`.
pub fn env_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidLevel(e.to_string())),
    }
}

/// Initialize the global subscriber.
///
/// # Arguments
/// * `level` - Log level filter string (e.g., "info", "debug")
/// * `format` - Log format ("text" or "json")
pub fn init(level: &str, format: &str) -> Result<(), LoggingError> {
    let subscriber = tracing_subscriber::registry().with(env_filter(level)?);

    if format.eq_ignore_ascii_case("json") {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| LoggingError::SubscriberError(e.to_string()))
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| LoggingError::SubscriberError(e.to_string()))
    }
}

/// Re-export tracing macros for convenience
pub mod prelude {
    pub use tracing::Instrument;
    pub use tracing::{debug, error, info, trace, warn};
    pub use tracing::{instrument, span, Level};
}
