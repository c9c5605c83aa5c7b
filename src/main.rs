use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod domain;
mod error;
mod infrastructure;
mod services;
mod tools;
mod ui;

#[cfg(test)]
mod test_support;

use cli::{AuthCommands, Cli, Commands};
use commands::{auth, deploy, destroy, status, watch};
use domain::Platform;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false)
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Deploy(args) => {
            deploy::execute(args, config).await?;
        }
        Commands::Destroy { name, yes } => {
            destroy::execute(name, yes, config).await?;
        }
        Commands::Status { name, timeout } => {
            status::execute(name, timeout, config).await?;
        }
        Commands::Watch(args) => {
            watch::execute(args, config).await?;
        }
        Commands::Auth { provider } => match provider {
            AuthCommands::Fly(args) => auth::execute(Platform::Fly, args).await?,
            AuthCommands::Railway(args) => auth::execute(Platform::Railway, args).await?,
        },
    }

    Ok(())
}
