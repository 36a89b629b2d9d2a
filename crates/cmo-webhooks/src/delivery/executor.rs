/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Single HTTP delivery attempts.
//!
//! The executor is the only component that performs network I/O. It never
//! touches the stores: callers record the returned [`DeliveryOutcome`].

use crate::error::{Result, WebhookError};
use crate::utils::signing::{canonical_payload, SIGNATURE_HEADER};
use cmo_models::models::{DeliveryRecord, WebhookSubscription};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Header naming the event type of the delivery.
pub const EVENT_HEADER: &str = "X-Webhook-Event";
/// Header carrying the delivery record id.
pub const DELIVERY_HEADER: &str = "X-Webhook-Delivery";

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The attempt exceeded the subscription's timeout.
    Timeout,
    /// The request never produced an HTTP response.
    Transport,
    /// The endpoint answered with a non-2xx status.
    Protocol(u16),
}

impl FailureKind {
    /// Whether the failure was a 4xx other than 408 and 429.
    pub fn is_client_error(&self) -> bool {
        matches!(self, FailureKind::Protocol(code) if (400..500).contains(code) && *code != 408 && *code != 429)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::Transport => f.write_str("transport"),
            FailureKind::Protocol(code) => write!(f, "http {}", code),
        }
    }
}

/// Result of a webhook delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    /// Whether delivery succeeded.
    pub success: bool,
    /// HTTP status code (if a response arrived).
    pub status_code: Option<u16>,
    /// Truncated response body.
    pub body_excerpt: Option<String>,
    /// Error message (if failed).
    pub error: Option<String>,
    /// Failure classification (if failed).
    pub failure: Option<FailureKind>,
    /// Delivery duration in milliseconds.
    pub duration_ms: u64,
}

impl DeliveryOutcome {
    fn failed(failure: FailureKind, error: String, duration_ms: u64) -> Self {
        Self {
            success: false,
            status_code: None,
            body_excerpt: None,
            error: Some(error),
            failure: Some(failure),
            duration_ms,
        }
    }
}

/// Performs HTTP POSTs for delivery records.
#[derive(Debug, Clone)]
pub struct DeliveryExecutor {
    client: Client,
    user_agent: String,
    excerpt_limit: usize,
}

impl DeliveryExecutor {
    /// Builds an executor sharing one connection pool across attempts.
    ///
    /// # Arguments
    /// * `user_agent` - Value of the `User-Agent` header.
    /// * `excerpt_limit` - Characters of response body kept per attempt.
    pub fn new(user_agent: impl Into<String>, excerpt_limit: usize) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| WebhookError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: user_agent.into(),
            excerpt_limit,
        })
    }

    /// Sends `record`'s envelope to its target once.
    ///
    /// The subscription supplies the timeout and custom headers; the record
    /// supplies the URL, the envelope and its signature.
    pub async fn attempt(
        &self,
        record: &DeliveryRecord,
        subscription: &WebhookSubscription,
    ) -> DeliveryOutcome {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        let request = self
            .client
            .post(&record.target_url)
            .headers(self.headers(record, subscription))
            .timeout(Duration::from_millis(subscription.timeout_ms))
            .body(canonical_payload(&record.envelope));

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let duration_ms = elapsed(start);
                let (kind, message) = classify_error(&e, subscription.timeout_ms);
                warn!(
                    "Webhook delivery {} to {} failed after {}ms: {}",
                    record.id, record.target_url, duration_ms, message
                );
                return DeliveryOutcome::failed(kind, message, duration_ms);
            }
        };

        let status = response.status();
        let body = self.read_excerpt(response, record).await;
        let duration_ms = elapsed(start);

        if status.is_success() {
            debug!(
                "Webhook delivery {} succeeded with status {} in {}ms",
                record.id, status, duration_ms
            );
            DeliveryOutcome {
                success: true,
                status_code: Some(status.as_u16()),
                body_excerpt: body,
                error: None,
                failure: None,
                duration_ms,
            }
        } else {
            warn!(
                "Webhook delivery {} failed with status {}",
                record.id, status
            );
            DeliveryOutcome {
                success: false,
                status_code: Some(status.as_u16()),
                body_excerpt: body,
                error: Some(format!("HTTP {}", status.as_u16())),
                failure: Some(FailureKind::Protocol(status.as_u16())),
                duration_ms,
            }
        }
    }

    /// Reads at most `excerpt_limit` characters of the response body.
    ///
    /// The rest of the body is never pulled from the connection. A body that
    /// errors or times out midway keeps whatever arrived before it.
    async fn read_excerpt(
        &self,
        mut response: reqwest::Response,
        record: &DeliveryRecord,
    ) -> Option<String> {
        let byte_limit = self.excerpt_limit.saturating_mul(4);
        let mut buffer: Vec<u8> = Vec::new();

        while buffer.len() < byte_limit {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let take = chunk.len().min(byte_limit - buffer.len());
                    buffer.extend_from_slice(&chunk[..take]);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(
                        "Stopped reading response body for delivery {}: {}",
                        record.id, e
                    );
                    if buffer.is_empty() {
                        return None;
                    }
                    break;
                }
            }
        }

        Some(truncate(&String::from_utf8_lossy(&buffer), self.excerpt_limit))
    }

    /// Custom headers first, then the fixed ones, which always win.
    fn headers(&self, record: &DeliveryRecord, subscription: &WebhookSubscription) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &subscription.custom_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(
                    "Skipping invalid custom header {:?} on subscription {}",
                    name, subscription.id
                ),
            }
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match HeaderValue::from_str(&self.user_agent) {
            Ok(value) => {
                headers.insert(USER_AGENT, value);
            }
            Err(_) => warn!("Configured user agent is not a valid header value"),
        }
        headers.insert(
            HeaderName::from_static("x-webhook-event"),
            HeaderValue::from_static(record.event_type.as_str()),
        );
        if let Ok(value) = HeaderValue::from_str(&record.id.to_string()) {
            headers.insert(HeaderName::from_static("x-webhook-delivery"), value);
        }

        let signature_header = HeaderName::from_static("x-webhook-signature");
        headers.remove(&signature_header);
        if let Some(signature) = record.envelope.signature.as_deref() {
            if let Ok(value) = HeaderValue::from_str(signature) {
                headers.insert(signature_header, value);
            }
        }

        headers
    }
}

/// Classifies request errors for logging and retry decisions.
fn classify_error(error: &reqwest::Error, timeout_ms: u64) -> (FailureKind, String) {
    if error.is_timeout() {
        (
            FailureKind::Timeout,
            format!("Request timed out after {}ms", timeout_ms),
        )
    } else if error.is_connect() {
        (FailureKind::Transport, format!("Connection failed: {}", error))
    } else if error.is_builder() {
        (FailureKind::Transport, format!("Invalid request: {}", error))
    } else {
        (FailureKind::Transport, format!("Request error: {}", error))
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
