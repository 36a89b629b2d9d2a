/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Event catalog for webhook notifications.
//!
//! Every outbound notification carries one of a fixed set of event types and
//! a tag describing where the triggering event originated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Returned when parsing an event type outside of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

/// Returned when parsing an unknown event source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event source: {0}")]
pub struct UnknownEventSource(pub String);

/// Event types a webhook subscription can register interest in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "alert.created")]
    AlertCreated,
    #[serde(rename = "alert.resolved")]
    AlertResolved,
    #[serde(rename = "transit.delayed")]
    TransitDelayed,
    #[serde(rename = "precinto.violated")]
    PrecintoViolated,
    #[serde(rename = "system.error")]
    SystemError,
    #[serde(rename = "user.login")]
    UserLogin,
    #[serde(rename = "data.export")]
    DataExport,
    #[serde(rename = "threshold.exceeded")]
    ThresholdExceeded,
    #[serde(rename = "webhook.test")]
    WebhookTest,
}

impl EventType {
    /// The full catalog, in declaration order.
    pub const ALL: [EventType; 9] = [
        EventType::AlertCreated,
        EventType::AlertResolved,
        EventType::TransitDelayed,
        EventType::PrecintoViolated,
        EventType::SystemError,
        EventType::UserLogin,
        EventType::DataExport,
        EventType::ThresholdExceeded,
        EventType::WebhookTest,
    ];

    /// Wire representation of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AlertCreated => "alert.created",
            EventType::AlertResolved => "alert.resolved",
            EventType::TransitDelayed => "transit.delayed",
            EventType::PrecintoViolated => "precinto.violated",
            EventType::SystemError => "system.error",
            EventType::UserLogin => "user.login",
            EventType::DataExport => "data.export",
            EventType::ThresholdExceeded => "threshold.exceeded",
            EventType::WebhookTest => "webhook.test",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// Origin of the event that triggered a delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    #[default]
    Cmo,
    External,
    System,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Cmo => "cmo",
            EventSource::External => "external",
            EventSource::System => "system",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = UnknownEventSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cmo" => Ok(EventSource::Cmo),
            "external" => Ok(EventSource::External),
            "system" => Ok(EventSource::System),
            other => Err(UnknownEventSource(other.to_string())),
        }
    }
}
