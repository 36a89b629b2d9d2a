/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # CMO Webhooks
//!
//! `cmo-webhooks` delivers CMO platform events to external HTTP endpoints.
//! Subscribers register a target URL for a set of event types; each matching
//! event is signed with the subscriber's secret, POSTed, retried with
//! exponential backoff, and recorded in a delivery history.
//!
//! [`WebhookService`] is the entry point for library use. The `cmo-webhooks`
//! binary exposes the same operations over HTTP and on the command line.

pub mod api;
pub mod cli;
pub mod dal;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod service;
pub mod utils;

pub use error::WebhookError;
pub use service::WebhookService;
