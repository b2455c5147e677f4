//! StudyCollab CLI - Inspect and sync the offline store from the terminal
//!
//! Works against the same database the app uses: cached rows, the pending
//! change queue, sync errors and conflicts.

mod cli;
mod commands;
mod error;
mod remote;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::commands::cache::run_cache;
use crate::commands::common::CliContext;
use crate::commands::config::{run_config_init, run_config_show};
use crate::commands::conflicts::run_conflicts;
use crate::commands::errors::run_errors;
use crate::commands::pull::run_pull;
use crate::commands::queue::run_queue;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
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

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "studycollab=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = CliContext::load(cli.db_path, cli.config)?;

    match cli.command {
        Commands::Status { no_probe, json } => run_status(&context, !no_probe, json).await?,
        Commands::Cache { command } => run_cache(&context, command).await?,
        Commands::Queue { command } => run_queue(&context, command).await?,
        Commands::Sync {
            strategy,
            resolution,
            json,
        } => run_sync(&context, strategy, resolution, json).await?,
        Commands::Pull { table, since } => run_pull(&context, &table, since).await?,
        Commands::Errors { command } => run_errors(&context, command).await?,
        Commands::Conflicts { command } => run_conflicts(&context, command).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Init {
                supabase_url,
                supabase_anon_key,
                strategy,
            } => run_config_init(&context, supabase_url, supabase_anon_key, strategy)?,
            ConfigCommands::Show => run_config_show(&context)?,
        },
    }

    Ok(())
}
