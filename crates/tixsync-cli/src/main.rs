//! tixsync CLI - keep an offline replica of ticketing data up to date
//!
//! Connection settings come from `TIXSYNC_*` environment variables, falling
//! back to the selected profile in the CLI config file.

mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::lookup::run_lookup;
use crate::commands::reset::run_reset;
use crate::commands::status::run_status;
use crate::commands::sync::{run_cleanup, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tixsync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Sync {
            events,
            resource,
            no_cleanup,
            json,
        } => {
            run_sync(
                events,
                resource.as_deref(),
                no_cleanup,
                json,
                profile,
                &db_path,
            )
            .await?;
        }
        Commands::Status { json } => run_status(json, &db_path).await?,
        Commands::Reset {
            event,
            resource,
            all,
        } => run_reset(event.as_deref(), resource.as_deref(), all, &db_path).await?,
        Commands::Cleanup { keep, json } => run_cleanup(keep, json, profile, &db_path).await?,
        Commands::Lookup {
            key,
            resource,
            json,
        } => run_lookup(&key, &resource, json, &db_path).await?,
        Commands::Config { command } => run_config(command, profile)?,
    }

    Ok(())
}
