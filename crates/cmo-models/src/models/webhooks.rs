/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Webhook subscription models.
//!
//! A subscription registers a destination URL for a set of event types,
//! optionally narrowed by conditional filters over the event data.

use crate::models::events::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

// =============================================================================
// Constants
// =============================================================================

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Maximum length of a subscription name.
pub const MAX_NAME_LENGTH: usize = 255;

// =============================================================================
// Validation
// =============================================================================

/// Invalid subscription data, rejected before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("target URL cannot be empty")]
    EmptyUrl,
    #[error("at least one event type is required")]
    NoEvents,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("name cannot exceed {MAX_NAME_LENGTH} characters")]
    NameTooLong,
    #[error("custom header names cannot be empty")]
    EmptyHeaderName,
    #[error("filter field cannot be empty")]
    EmptyFilterField,
}

// =============================================================================
// Filters
// =============================================================================

/// Comparison applied by a [`WebhookFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::Gte => ">=",
            FilterOperator::Lte => "<=",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "not_contains",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" | "==" => Ok(FilterOperator::Eq),
            "!=" => Ok(FilterOperator::Ne),
            ">" => Ok(FilterOperator::Gt),
            "<" => Ok(FilterOperator::Lt),
            ">=" => Ok(FilterOperator::Gte),
            "<=" => Ok(FilterOperator::Lte),
            "contains" => Ok(FilterOperator::Contains),
            "not_contains" => Ok(FilterOperator::NotContains),
            other => Err(format!("Unknown filter operator: {}", other)),
        }
    }
}

/// A single `(field path, operator, value)` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookFilter {
    /// Dotted path into the event data (e.g. "data.priority").
    pub field: String,
    /// Comparison to apply.
    pub operator: FilterOperator,
    /// Value the resolved field is compared against.
    pub value: serde_json::Value,
}

impl WebhookFilter {
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

// =============================================================================
// Webhook Subscription Models
// =============================================================================

/// A durable registration of interest in a set of event types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    /// Unique identifier, assigned at creation.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Destination endpoint.
    pub target_url: String,
    /// Shared secret used to sign payloads. Absent means unsigned delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Event types this subscription receives.
    pub subscribed_events: BTreeSet<EventType>,
    /// Inactive subscriptions are skipped by dispatch but kept for history.
    pub active: bool,
    /// Additional attempts allowed after the first failure.
    pub max_retries: u32,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Extra HTTP headers attached to each delivery.
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
    /// Conditions that must all pass for the subscription to receive an event.
    #[serde(default)]
    pub filters: Vec<WebhookFilter>,
    /// Number of successful deliveries.
    #[serde(default)]
    pub success_count: u64,
    /// Number of deliveries that ended in failure.
    #[serde(default)]
    pub error_count: u64,
    /// Most recent successful delivery.
    #[serde(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// When the subscription was created.
    pub created_at: DateTime<Utc>,
    /// When the subscription was last modified.
    pub updated_at: DateTime<Utc>,
}

impl WebhookSubscription {
    /// Whether this subscription registered interest in `event_type`.
    pub fn is_subscribed_to(&self, event_type: EventType) -> bool {
        self.subscribed_events.contains(&event_type)
    }

    /// Whether deliveries for this subscription carry a signature.
    pub fn is_signed(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Whether the target URL parses as an http(s) URL.
    ///
    /// Advisory only: subscriptions with an invalid URL are still stored.
    pub fn has_valid_url(&self) -> bool {
        is_valid_target_url(&self.target_url)
    }

    /// Checks the invariants a stored subscription must hold.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target_url.trim().is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        if self.subscribed_events.is_empty() {
            return Err(ValidationError::NoEvents);
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::ZeroTimeout);
        }
        if self.name.len() > MAX_NAME_LENGTH {
            return Err(ValidationError::NameTooLong);
        }
        if self.custom_headers.keys().any(|k| k.trim().is_empty()) {
            return Err(ValidationError::EmptyHeaderName);
        }
        if self.filters.iter().any(|f| f.field.trim().is_empty()) {
            return Err(ValidationError::EmptyFilterField);
        }
        Ok(())
    }

    /// Applies a partial update, returning a validated copy.
    ///
    /// The receiver is left untouched when validation fails.
    pub fn patched(&self, update: &UpdateWebhookSubscription) -> Result<Self, ValidationError> {
        let mut next = self.clone();

        if let Some(name) = &update.name {
            next.name = name.clone();
        }
        if let Some(url) = &update.target_url {
            next.target_url = url.clone();
        }
        if let Some(secret) = &update.secret {
            next.secret = secret.clone().filter(|s| !s.is_empty());
        }
        if let Some(events) = &update.subscribed_events {
            next.subscribed_events = events.iter().copied().collect();
        }
        if let Some(active) = update.active {
            next.active = active;
        }
        if let Some(max_retries) = update.max_retries {
            next.max_retries = max_retries;
        }
        if let Some(timeout_ms) = update.timeout_ms {
            next.timeout_ms = timeout_ms;
        }
        if let Some(headers) = &update.custom_headers {
            next.custom_headers = headers.clone();
        }
        if let Some(filters) = &update.filters {
            next.filters = filters.clone();
        }

        next.validate()?;
        next.updated_at = Utc::now();
        Ok(next)
    }
}

/// Configuration for a subscription to be created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWebhookSubscription {
    /// Human-readable name. Defaults to the target host.
    #[serde(default)]
    pub name: Option<String>,
    /// Destination endpoint.
    pub target_url: String,
    /// Optional shared secret for signing.
    #[serde(default)]
    pub secret: Option<String>,
    /// Event types to subscribe to.
    pub subscribed_events: Vec<EventType>,
    /// Whether the subscription starts active (defaults to true).
    #[serde(default)]
    pub active: Option<bool>,
    /// Retry budget (defaults to the configured value).
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Per-attempt timeout (defaults to the configured value).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Extra HTTP headers.
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
    /// Conditional filters.
    #[serde(default)]
    pub filters: Vec<WebhookFilter>,
}

impl NewWebhookSubscription {
    /// Starts a creation config for `target_url` receiving `events`.
    pub fn new(target_url: impl Into<String>, events: Vec<EventType>) -> Self {
        Self {
            target_url: target_url.into(),
            subscribed_events: events,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_filter(mut self, filter: WebhookFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Builds the stored record, assigning an id and zeroed counters.
    ///
    /// # Arguments
    /// * `default_max_retries` - Retry budget used when none was given.
    /// * `default_timeout_ms` - Timeout used when none was given.
    pub fn into_subscription(
        self,
        default_max_retries: u32,
        default_timeout_ms: u64,
    ) -> Result<WebhookSubscription, ValidationError> {
        let now = Utc::now();
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_name(&self.target_url));

        let subscription = WebhookSubscription {
            id: Uuid::new_v4(),
            name,
            target_url: self.target_url,
            secret: self.secret.filter(|s| !s.is_empty()),
            subscribed_events: self.subscribed_events.into_iter().collect(),
            active: self.active.unwrap_or(true),
            max_retries: self.max_retries.unwrap_or(default_max_retries),
            timeout_ms: self.timeout_ms.unwrap_or(default_timeout_ms),
            custom_headers: self.custom_headers,
            filters: self.filters,
            success_count: 0,
            error_count: 0,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        };

        subscription.validate()?;
        Ok(subscription)
    }
}

/// Partial update for a subscription. Omitted fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWebhookSubscription {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    /// `null` removes the secret, omission keeps it.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub secret: Option<Option<String>>,
    #[serde(default)]
    pub subscribed_events: Option<Vec<EventType>>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub custom_headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub filters: Option<Vec<WebhookFilter>>,
}

/// Distinguishes an explicit `null` from an absent field.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

fn default_name(target_url: &str) -> String {
    let name = Url::parse(target_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| target_url.to_string());
    if name.len() <= MAX_NAME_LENGTH {
        return name;
    }
    let mut end = MAX_NAME_LENGTH;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Returns true when `target_url` is a well-formed http(s) URL.
pub fn is_valid_target_url(target_url: &str) -> bool {
    Url::parse(target_url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

// =============================================================================
// Tests
// =============================================================================
