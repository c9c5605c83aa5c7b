//! Command implementations
//!
//! Each subcommand lives in its own module with an `execute` entry point.
//! Only this layer prints final output; everything below returns errors.

pub mod auth;
pub mod deploy;
pub mod destroy;
pub mod status;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{
    artifacts_dir, CredentialsStore, DeploymentRecord, ProjectConfig, State, DEFAULT_REGION,
};
use crate::domain::{Deployment, Platform};
use crate::error::StateError;
use crate::services::ProviderOptions;

pub fn project_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to get working directory")
}

pub fn load_project(config: Option<&Path>, project_dir: &Path) -> Result<ProjectConfig> {
    ProjectConfig::load(config, project_dir).context("Failed to load project config")
}

/// Provider inputs for commands that take no token flag
pub fn provider_options(project_dir: &Path) -> Result<ProviderOptions> {
    Ok(ProviderOptions {
        project_dir: project_dir.to_path_buf(),
        access_token: None,
        credentials: CredentialsStore::default_location()
            .context("Failed to locate credentials file")?,
    })
}

/// Token cancelled on Ctrl-C or SIGTERM
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });
    token
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("🛑 Received Ctrl+C"),
        () = terminate => info!("🛑 Received SIGTERM"),
    }
}

/// Find the deployment a command targets
///
/// With no name, the last deployment from local state. An explicit name
/// that local state doesn't know gets a record with the platform's
/// predicted URLs, so deployments made elsewhere can still be queried.
pub fn resolve_record(
    state: &State,
    name: Option<&str>,
    fallback: Platform,
    project_dir: &Path,
) -> Result<DeploymentRecord> {
    let explicit = name.map(str::trim).filter(|n| !n.is_empty());
    match (state.resolve(explicit), explicit) {
        (Ok(record), _) => Ok(record.clone()),
        (Err(StateError::NotFound(_) | StateError::NoDeployments), Some(name)) => {
            let predicted = Deployment::from_host(
                name,
                fallback,
                &fallback.default_host(name),
                artifacts_dir(project_dir, name),
            );
            Ok(DeploymentRecord::from_deployment(&predicted, DEFAULT_REGION))
        }
        (Err(StateError::NoDeployments), None) => {
            anyhow::bail!("No deployments found; run `sol-cloud deploy` or pass a deployment name")
        }
        (Err(e), _) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(name: &str, platform: Platform) -> State {
        let deployment = Deployment::from_host(
            name,
            platform,
            &platform.default_host(name),
            "/tmp/project/.sol-cloud/deployments",
        );
        let mut state = State::default();
        state.upsert(DeploymentRecord::from_deployment(&deployment, "ord"));
        state
    }

    #[test]
    fn test_last_deployment_is_default() {
        let state = state_with("alpha", Platform::Railway);
        let record = resolve_record(&state, None, Platform::Fly, Path::new("/tmp/project")).unwrap();
        assert_eq!(record.name, "alpha");
        assert_eq!(record.provider, Platform::Railway);
    }

    #[test]
    fn test_unknown_explicit_name_predicts_urls() {
        let state = state_with("alpha", Platform::Fly);
        let record =
            resolve_record(&state, Some("elsewhere"), Platform::Fly, Path::new("/tmp/project")).unwrap();
        assert_eq!(record.rpc_url, "https://elsewhere.fly.dev");
        assert_eq!(record.websocket_url, "wss://elsewhere.fly.dev");

        let empty = State::default();
        let record =
            resolve_record(&empty, Some("elsewhere"), Platform::Railway, Path::new("/tmp/project")).unwrap();
        assert_eq!(record.rpc_url, "https://elsewhere.up.railway.app");
    }

    #[test]
    fn test_empty_state_without_name_is_error() {
        let err = resolve_record(&State::default(), None, Platform::Fly, Path::new("/tmp/project"))
            .unwrap_err();
        assert!(err.to_string().contains("No deployments found"));
    }
}
