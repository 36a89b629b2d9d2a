/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # CMO Config Module
//! Layered configuration shared by the CMO webhook crates.
//!
//! # Variable Naming Convention
//!
//! - Struct fields use snake_case (e.g., `webhooks`, `default_max_retries`)
//! - Environment variables use SCREAMING_SNAKE_CASE and are prefixed with "CMO__"
//!   (e.g., `CMO__WEBHOOKS__DEFAULT_MAX_RETRIES`)
//! - Configuration file keys use snake_case (e.g., `webhooks.default_max_retries`)
//!
//! # Configuration Overriding
//!
//! Values are loaded in the following order (later sources take precedence):
//!
//! 1. Default values from the embedded `default.toml` file
//! 2. Values from an optional external configuration file (if provided)
//! 3. Environment variables
//!
//! # Available Environment Variables
//!
//! - `CMO__LOG__LEVEL`: Log level. Default: "info"
//! - `CMO__LOG__FORMAT`: "text" or "json". Default: "text"
//! - `CMO__STORAGE__PATH`: Directory for persisted state. Empty keeps state in memory.
//! - `CMO__STORAGE__MAX_DELIVERY_HISTORY`: Delivery records kept. Default: 1000
//! - `CMO__WEBHOOKS__DEFAULT_MAX_RETRIES`: Default: 3
//! - `CMO__WEBHOOKS__DEFAULT_TIMEOUT_MS`: Default: 10000
//! - `CMO__WEBHOOKS__USER_AGENT`: Default: "CMO-Webhooks/1.0"
//! - `CMO__WEBHOOKS__RETRY_BASE_DELAY_MS`: Default: 1000
//! - `CMO__WEBHOOKS__RETRY_MAX_DELAY_MS`: Default: 30000
//! - `CMO__WEBHOOKS__RESPONSE_EXCERPT_LIMIT`: Default: 1000
//! - `CMO__WEBHOOKS__PROBE_ON_CREATE`: Default: false
//! - `CMO__WEBHOOKS__RETRY_CLIENT_ERRORS`: Default: true
//! - `CMO__WEBHOOKS__EVENT_CHANNEL_SIZE`: Default: 1000
//! - `CMO__WEBHOOKS__CLEANUP_INTERVAL_SECONDS`: Default: 3600
//! - `CMO__WEBHOOKS__RETENTION_DAYS`: Default: 7
//! - `CMO__SERVER__BIND_ADDRESS`: Default: "0.0.0.0:3000"

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

// Include the default settings file as a string constant
const DEFAULT_SETTINGS: &str = include_str!("../default.toml");

/// Represents the main settings structure for the application
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Logging configuration
    pub log: Log,
    /// Persistence configuration
    pub storage: Storage,
    /// Webhook delivery configuration
    pub webhooks: Webhooks,
    /// HTTP server configuration
    pub server: Server,
}

/// Represents the logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,
    /// Log format: "text" for human-readable, "json" for structured JSON
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Represents the persistence configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Storage {
    /// Directory holding one JSON document per store. Empty means in-memory.
    #[serde(default)]
    pub path: String,
    /// Maximum number of delivery records retained
    pub max_delivery_history: usize,
}

impl Storage {
    /// Whether state should be written to disk.
    pub fn is_persistent(&self) -> bool {
        !self.path.trim().is_empty()
    }
}

/// Represents the webhook delivery configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Webhooks {
    /// Retry budget for subscriptions created without one
    pub default_max_retries: u32,
    /// Per-attempt timeout for subscriptions created without one
    pub default_timeout_ms: u64,
    /// User-Agent sent with each delivery
    pub user_agent: String,
    /// First retry delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// Upper bound for any retry delay in milliseconds
    pub retry_max_delay_ms: u64,
    /// Characters of response body kept on a delivery record
    pub response_excerpt_limit: usize,
    /// Send a test delivery when a subscription is created
    #[serde(default)]
    pub probe_on_create: bool,
    /// Retry 4xx responses other than 408 and 429
    #[serde(default = "default_true")]
    pub retry_client_errors: bool,
    /// Capacity of the event bus channel
    pub event_channel_size: usize,
    /// Interval between delivery history cleanups
    pub cleanup_interval_seconds: u64,
    /// Age after which terminal delivery records are removed
    pub retention_days: i64,
}

fn default_true() -> bool {
    true
}

/// Represents the HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    /// Socket address the API listens on
    pub bind_address: String,
}

impl Settings {
    /// Creates a new `Settings` instance
    ///
    /// # Arguments
    ///
    /// * `file` - An optional path to a configuration file
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the `Settings` instance or a `ConfigError`
    pub fn new(file: Option<String>) -> Result<Self, ConfigError> {
        let mut s = Config::builder()
            .add_source(File::from_str(DEFAULT_SETTINGS, config::FileFormat::Toml));

        s = match file {
            Some(x) => s.add_source(File::with_name(x.as_str())),
            None => s,
        };

        // Environment variables prefixed with "CMO" using "__" as a separator
        s = s.add_source(Environment::with_prefix("CMO").separator("__"));

        s.build()?.try_deserialize()
    }
}
