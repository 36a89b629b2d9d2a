/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

pub mod commands;

use clap::{Args, Parser, Subcommand};
use cmo_models::models::{EventSource, EventType};
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
/// CMO Webhooks CLI
///
/// Serves the webhook API, or inspects and drives the persisted webhook
/// state directly.
pub struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(long, global = true, env = "CMO_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the webhook server
    Serve,

    /// List webhook subscriptions
    Subscriptions {
        /// Only show active subscriptions
        #[arg(long)]
        active_only: bool,
    },

    /// List delivery records, most recent first
    Deliveries(DeliveryArgs),

    /// Show delivery statistics
    Stats {
        /// Restrict to one subscription
        #[arg(long)]
        subscription: Option<Uuid>,
    },

    /// Dispatch an event to matching subscriptions
    Trigger {
        /// Event type, e.g. alert.created
        event: EventType,
        /// Event data as JSON
        #[arg(long, default_value = "{}")]
        data: String,
        /// Origin of the event
        #[arg(long, default_value = "cmo")]
        source: EventSource,
    },

    /// Send a test delivery to a subscription
    Test {
        /// Subscription id
        id: Uuid,
    },
}

#[derive(Args)]
pub struct DeliveryArgs {
    /// Restrict to one subscription
    #[arg(long)]
    pub subscription: Option<Uuid>,
    /// Maximum number of records
    #[arg(long)]
    pub limit: Option<usize>,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
