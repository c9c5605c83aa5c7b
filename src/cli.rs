//! CLI definitions for sol-cloud
//!
//! This module contains all CLI argument parsing structures using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sol-cloud",
    version,
    about = "Deploy Solana test validators to Fly.io and Railway",
    long_about = "Deploy, monitor and tear down single-node Solana test validators.\nRemote resources are created idempotently, so re-running a deploy is safe."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project config file (defaults to .sol-cloud.yml in the current directory)
    #[arg(long, global = true, env = "SOL_CLOUD_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render artifacts and deploy a validator
    Deploy(DeployArgs),

    /// Destroy a deployed validator and its remote resources
    Destroy {
        /// Deployment name (defaults to the last deployment)
        name: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Show provider state and RPC metrics for a validator
    Status {
        /// Deployment name (defaults to the last deployment)
        name: Option<String>,

        /// Deadline for the RPC metric queries
        #[arg(long, default_value = "20s", value_parser = humantime::parse_duration)]
        timeout: Duration,
    },

    /// Watch slot progression and restart the validator when it stalls
    Watch(WatchArgs),

    /// Store and verify provider access tokens
    Auth {
        #[command(subcommand)]
        provider: AuthCommands,
    },
}

#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    /// Deployment name (overrides app_name in the project file; generated when absent)
    #[arg(long)]
    pub name: Option<String>,

    /// Platform region (overrides region in the project file)
    #[arg(long)]
    pub region: Option<String>,

    /// Hosting provider: fly or railway
    #[arg(long)]
    pub provider: Option<String>,

    /// Fly org slug or Railway workspace id
    #[arg(long)]
    pub org: Option<String>,

    /// Render files but skip every remote call
    #[arg(long)]
    pub dry_run: bool,

    /// Skip post-deploy RPC health validation
    #[arg(long)]
    pub skip_health_check: bool,

    /// Maximum wait for RPC health
    #[arg(long, default_value = "3m", value_parser = humantime::parse_duration)]
    pub health_timeout: Duration,

    /// Poll interval for RPC health checks
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub health_interval: Duration,

    /// Deploy without a persistent ledger volume
    #[arg(long)]
    pub skip_volume: bool,

    /// Ledger volume size in GB
    #[arg(long)]
    pub volume_size: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Deployment name (defaults to the last deployment)
    pub name: Option<String>,

    /// Polling frequency for slot checks
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub check_interval: Duration,

    /// How long the slot may stay unchanged before the validator counts as stuck
    #[arg(long, default_value = "3m", value_parser = humantime::parse_duration)]
    pub stuck_threshold: Duration,

    /// Maximum restart attempts (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub max_restarts: u32,

    /// Minimum time between restarts
    #[arg(long, default_value = "2m", value_parser = humantime::parse_duration)]
    pub restart_cooldown: Duration,

    /// Restart without asking for confirmation
    #[arg(long)]
    pub auto_restart: bool,
}

/// Auth subcommands
#[derive(Subcommand)]
pub enum AuthCommands {
    /// Connect Fly.io with a personal or org access token
    Fly(AuthArgs),

    /// Connect Railway with an account or workspace token
    Railway(AuthArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct AuthArgs {
    /// Access token (prompted for when omitted)
    #[arg(long)]
    pub token: Option<String>,

    /// Default Fly org slug or Railway workspace id
    #[arg(long)]
    pub org: Option<String>,

    /// Save the token without contacting the provider
    #[arg(long)]
    pub skip_verify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_HEALTH_INTERVAL, DEFAULT_HEALTH_TIMEOUT};
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_watch_flags_parse_durations() {
        let cli = Cli::parse_from([
            "sol-cloud",
            "watch",
            "demo-validator",
            "--check-interval",
            "20s",
            "--stuck-threshold",
            "2m",
            "--auto-restart",
        ]);
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.name.as_deref(), Some("demo-validator"));
                assert_eq!(args.check_interval, Duration::from_secs(20));
                assert_eq!(args.stuck_threshold, Duration::from_secs(120));
                assert_eq!(args.restart_cooldown, Duration::from_secs(120));
                assert!(args.auto_restart);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_deploy_defaults() {
        let cli = Cli::parse_from(["sol-cloud", "deploy", "--provider", "railway"]);
        match cli.command {
            Commands::Deploy(args) => {
                assert_eq!(args.provider.as_deref(), Some("railway"));
                assert_eq!(args.health_timeout, DEFAULT_HEALTH_TIMEOUT);
                assert_eq!(args.health_interval, DEFAULT_HEALTH_INTERVAL);
                assert!(!args.dry_run);
            }
            _ => panic!("expected deploy"),
        }
    }
}
