/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! CMO Webhooks CLI application

use cmo_utils::config::Settings;
use cmo_webhooks::cli::{commands, parse_cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = parse_cli();

    let config = Settings::new(cli.config.clone())?;
    cmo_utils::logging::init(&config.log.level, &config.log.format)?;

    match cli.command {
        Commands::Serve => commands::serve(&config).await?,
        Commands::Subscriptions { active_only } => {
            commands::list_subscriptions(&config, active_only)?
        }
        Commands::Deliveries(args) => commands::list_deliveries(&config, &args)?,
        Commands::Stats { subscription } => commands::stats(&config, subscription)?,
        Commands::Trigger {
            event,
            data,
            source,
        } => commands::trigger(&config, event, &data, source).await?,
        Commands::Test { id } => commands::test(&config, id).await?,
    }
    Ok(())
}
